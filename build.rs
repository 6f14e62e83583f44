use std::env;
use std::path::PathBuf;

/// Point Windows builds at a vcpkg FFmpeg install when `FFMPEG_DIR` is unset.
///
/// Other targets rely on pkg-config discovery in `ffmpeg-sys-next`.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows"
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=gopseek needs FFmpeg development libraries; set FFMPEG_DIR (or VCPKG_ROOT) on Windows."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let install_dir = PathBuf::from(vcpkg_root).join("installed").join(triplet);

    if install_dir.exists() {
        println!(
            "cargo:warning=Found vcpkg FFmpeg at {0}; export FFMPEG_DIR={0} to make discovery explicit.",
            install_dir.display(),
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist.",
            install_dir.display(),
        );
    }
}

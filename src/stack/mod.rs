//! Base-image package knowledge: package managers and dependency profiles

pub mod package_manager;
pub mod profile;

pub use package_manager::{InstallScript, PackageManager};
pub use profile::{is_toolchain_package, BuilderProfile, TOOLCHAIN_BINARIES, TRUST_STORE_PATH};

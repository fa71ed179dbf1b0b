// Code Transformer
//
// Edits the disassembled class files and loose resources of a decoded tree:
// package rename, injected helper classes, launcher hooks and filler files.

pub mod error;
pub mod rename;
pub mod inject;
pub mod camouflage;

pub use error::{SmaliError, SmaliResult};
pub use rename::{random_package_name, rename_package, smali_roots, RenameReport};
pub use inject::{
    find_class_file, hook_launchers, inject_launch_reporter, inject_protection_stub, insert_launch_hook,
    reporter_descriptor, LaunchReporterConfig,
};
pub use camouflage::{add_camouflage, add_filler_asset, add_filler_drawable, CamouflageReport};

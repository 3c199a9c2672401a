// forge-domain library entry point
pub mod config;
pub mod error;
pub mod image;
pub mod locator;
pub mod target;
pub mod toolchain;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::DomainError;
pub use image::{BaseImage, ImageReference, ImageTag};
pub use locator::HarnessLocator;
pub use target::{BuildProfile, FuzzTargetDir, HarnessName, PlatformTriple, SourceRoot};
pub use toolchain::{FuzzTool, InstallerSource, TlsVersion, ToolchainChannel};

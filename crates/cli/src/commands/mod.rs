//! CLI Commands

pub mod destroy;
pub mod init;
pub mod run;

use wpacceptance_e2e::{CliContainerDriver, ContainerRuntime, E2eResult};

/// Container driver for `--runtime`, or whichever runtime is installed
pub fn container_driver(runtime: Option<ContainerRuntime>) -> E2eResult<CliContainerDriver> {
    match runtime {
        Some(runtime) => Ok(CliContainerDriver::new(runtime)),
        None => CliContainerDriver::detect(),
    }
}

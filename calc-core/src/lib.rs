//! Build driver for the calc language.
//!
//! The driver does no compiling of its own. It finds the external tools and
//! runs them in a fixed order, handing artifacts from one to the next
//! through a temporary workspace:
//!
//!   runtime.c  -- clang -c -->  runtime.o  --.
//!   source     -- calcc    -->  expr.ll       |
//!   expr.ll    -- llc      -->  expr.o     --+-- clang -->  executable
//!
//! Front ends (the CLI) should depend on this crate rather than spawning
//! the tools themselves.

// ---------------------------------------------------------------------
// Errors and cancellation
// ---------------------------------------------------------------------

pub mod error;
pub mod interrupt;

// ---------------------------------------------------------------------
// Inputs: tools and build requests
// ---------------------------------------------------------------------

pub mod toolchain;
pub mod request;

// ---------------------------------------------------------------------
// Execution: workspace, stage plan and executor
// ---------------------------------------------------------------------

pub mod workspace;
pub mod stage;
pub mod pipeline;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use error::DriverError;
pub use interrupt::CancelFlag;
pub use pipeline::{BuildOutcome, Pipeline, PipelineOptions, StageResult};
pub use request::{BuildRequest, DEFAULT_OUTPUT};
pub use stage::Stage;
pub use toolchain::{SearchPath, Tool, Toolchain};
pub use workspace::Workspace;

mod operation;
mod progress;
mod update;

pub use operation::{
    OperationDescriptor, OperationParams, StepDescriptor, CHANNEL_PREFIX, COMMAND_SUFFIX,
};
pub use progress::{is_done, reduce, ProgressState, Verdict};
pub use update::{OperationUpdate, StepFailure};

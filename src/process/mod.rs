mod bundle;
mod descriptor;
mod handler;
mod registry;
mod validate;
mod value;

pub use bundle::DEFAULT_ZIP_START;
pub use descriptor::{InputParameter, OutputParameter, ProcessBuilder, ProcessDescriptor};
pub use handler::{
    FnHandler, Handler, HandlerContext, HandlerError, HandlerOutput, LOG_FILE, handler_fn,
};
pub use registry::{ProcessRegistry, Processes};
pub use validate::bind_inputs;
pub use value::{Inputs, Value, ValueType};

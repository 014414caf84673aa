//! 认知层：Model Invoker、Loop Controller、过程事件

pub mod events;
pub mod invoker;
pub mod loop_;

pub use events::ReactEvent;
pub use invoker::{ModelInvoker, DEFAULT_SYSTEM_PROMPT};
pub use loop_::{react_loop, ReactResult, ReactSession};

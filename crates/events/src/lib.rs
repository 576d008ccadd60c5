//! Job lifecycle events and their distribution.
//!
//! The worker announces what happens to each job (processing, processed,
//! exception, failed) and when it stops. Observers subscribe through an
//! [`EventBus`]; the worker itself only sees the fire-and-forget
//! [`Dispatcher`] seam.

pub mod bus;
pub mod dispatcher;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use dispatcher::{BusDispatcher, Dispatcher, NullDispatcher};
pub use event::{JobEvent, JobEventKind, JobRef};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

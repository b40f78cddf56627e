pub mod context;
pub mod events;
pub mod queue;
pub mod signal_processor;

pub use context::BrainContext;
pub use events::{BrainEvent, BrainEventReceiver, BrainEventSender};
pub use queue::PriorityQueue;
pub use signal_processor::{ApprovalCounter, SignalProcessor, SignalProcessorCore};

mod message_publisher;
pub use message_publisher::MessagePublisher;

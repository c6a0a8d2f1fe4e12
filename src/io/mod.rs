pub mod deserializer;
pub mod format;
pub mod serializer;
mod value;

pub use deserializer::Deserializer;
pub use format::{SerializationError, SerializationFormat};
pub use serializer::Serializer;

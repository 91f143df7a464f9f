//! Concrete `Classifier` implementations, one per filter type.

pub mod buffer;
pub mod hostlookup;
pub mod useragent;
pub mod yara;

pub use buffer::Buffer;
pub use hostlookup::HostLookup;
pub use useragent::UserAgent;
pub use yara::Yara;

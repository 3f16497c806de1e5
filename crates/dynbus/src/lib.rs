//! # dynbus
//!
//! Call methods and read properties on objects that live in another process.
//!
//! ## Architecture
//!
//! - **ObjectHost**: owns the live objects of one endpoint and answers requests
//!   against them.
//! - **RemoteStub**: sends requests to one remote endpoint and correlates the
//!   responses.
//! - **ObjectProxy**: a cheap handle to a remote object; invoking it goes
//!   through its stub.
//! - **Router**: binds one host and any number of stubs to a transport and
//!   demultiplexes inbound traffic between them.
//!
//! The transport only moves bytes. Everything above it speaks the envelopes
//! defined in `dynwire`.

pub mod channel;
pub mod class;
pub mod config;
pub mod error;
pub mod host;
pub mod link;
pub mod marshal;
pub mod object;
pub mod proxy;
pub mod router;
pub mod stub;
pub mod transport;
pub mod value;

pub use channel::DuplexChannel;
pub use class::ClassDef;
pub use class::ClassInfo;
pub use config::RouterConfig;
pub use error::ErrorKind;
pub use host::ObjectHost;
pub use link::ConnectionState;
pub use object::Exposed;
pub use object::LiveObject;
pub use object::Record;
pub use proxy::Member;
pub use proxy::ObjectProxy;
pub use router::Router;
pub use stub::RemoteStub;
pub use transport::Transport;
pub use value::Value;

pub use dynwire::Json;
pub use dynwire::Reference;

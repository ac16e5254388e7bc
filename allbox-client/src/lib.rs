pub mod realtime;
pub mod remote;
pub mod session;
pub mod store;

pub use remote::{RemoteClient, RemoteConfig};
pub use session::{Session, SessionError};
pub use store::{DeviceStore, FileStorage, KvStorage, MemoryStorage, StoredDialog};

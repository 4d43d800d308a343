mod manager;
mod registry;

pub use manager::DeviceManager;
pub use registry::DeviceStore;

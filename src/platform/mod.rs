//! Device-facing collaborators: network reachability and location.

pub mod connectivity;
pub mod location;

pub use connectivity::{Connectivity, StaticConnectivity, TcpProbe};
pub use location::{last_known_or_default, LocationProvider, ManualLocationProvider};

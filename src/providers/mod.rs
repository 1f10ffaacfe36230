// External collaborator clients. Everything past these modules works on
// typed records; the loosely-typed wire shapes never escape this boundary.
pub mod cloud;
pub mod kube;

pub use cloud::{
    ClusterInfo, CloudClient, PoolState, PoolUpgradeProfile, UpgradeProfile, UpgradeRecord,
};
pub use kube::ClusterObjects;

// This file makes `carver` into a rust library crate.

// The file `main.rs` still exists to make `carver` into an executable.

pub mod carving;
pub mod coloring;
pub mod depth_map;
pub mod export_obj;
pub mod export_ply;
pub mod mask;
pub mod mesh;
pub mod pipeline;
pub mod point_cloud;
pub mod reconstruct;
pub mod turntable;
pub mod view;

pub use base;

pub type Point3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;

// Rows follow image Y, columns follow image X.
pub type ImageMask = nalgebra::DMatrix<bool>;

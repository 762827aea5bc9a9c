//! RPC handlers for the controller and the file server.

pub mod controller;
pub mod fileserver;

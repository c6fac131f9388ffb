//! Innotter - A small social network backend
//!
//! Users own one page each, publish posts and tags on it, and follow each
//! other's pages. Private pages take follow requests that the owner
//! accepts or rejects.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

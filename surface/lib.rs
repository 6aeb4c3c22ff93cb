#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod composite;
pub mod config;
pub mod data;
pub mod describe;
pub mod model;
pub mod pipeline;
pub mod regression;
pub mod report;
pub mod rescore;
pub mod response_surface;
pub mod standardize;
pub mod table;

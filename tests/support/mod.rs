#![allow(dead_code)]

pub mod engine;
pub mod env;
pub mod runner;

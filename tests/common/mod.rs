#![allow(dead_code)]

pub mod fbx_writer;
pub mod test_utils;

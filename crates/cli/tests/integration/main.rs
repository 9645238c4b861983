mod common;

mod boot_tests;
mod resolve_tests;

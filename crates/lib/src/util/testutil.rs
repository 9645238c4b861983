//! Test utilities for gsnode-lib.
//!
//! Delegated commands used by bootstrap tests. They go through `/bin/sh` so exit
//! codes and environment expansion behave the way a container entrypoint sees them.

/// Argument vector that exits with `code`.
pub fn shell_exit(code: i32) -> Vec<String> {
  vec!["/bin/sh".to_string(), "-c".to_string(), format!("exit {}", code)]
}

/// Argument vector that writes the value of `var` into `out_file`.
pub fn shell_dump_env(var: &str, out_file: &std::path::Path) -> Vec<String> {
  vec![
    "/bin/sh".to_string(),
    "-c".to_string(),
    format!("printf '%s' \"${}\" > '{}'", var, out_file.display()),
  ]
}

/// Argument vector that creates `marker` and exits 0.
pub fn touch_file(marker: &std::path::Path) -> Vec<String> {
  vec!["/usr/bin/touch".to_string(), marker.display().to_string()]
}

// Process exit codes
pub const EXIT_SUCCESS: i32 = 0;
/// Any fatal condition, and strict-mode validation failures.
pub const EXIT_GENERIC_FAIL: i32 = 1;

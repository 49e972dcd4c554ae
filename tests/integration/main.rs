//! Integration tests for memlog.

mod helpers;

mod cli_test;
mod compress_test;
mod report_test;
mod split_test;

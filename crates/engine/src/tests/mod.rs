mod helpers;

mod merge_tests;
mod read_tests;

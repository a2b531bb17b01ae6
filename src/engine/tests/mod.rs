mod helpers;

mod tests_background;
mod tests_basic;
mod tests_errors;

mod helpers;

mod tests_range;

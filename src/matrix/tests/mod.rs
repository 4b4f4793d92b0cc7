pub mod helpers;
mod tests_history;
mod tests_keys;

mod tests_keys;
mod tests_values;

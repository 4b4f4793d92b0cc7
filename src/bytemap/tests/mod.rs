mod tests_file;
mod tests_memory;

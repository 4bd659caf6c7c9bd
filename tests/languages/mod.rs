mod tests_activity_diagram;
mod tests_scl;

mod tests_artifact;
mod tests_builder;

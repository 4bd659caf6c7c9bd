mod tests_ambiguity;
mod tests_external_scanner;
mod tests_incremental;
mod tests_interrupt;
mod tests_parse;
mod tests_properties;
mod tests_recovery;

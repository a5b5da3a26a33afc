mod concurrency_test;
mod property_test;
mod registry_test;
mod support;

mod install_tests;
mod service_tests;
mod store_tests;

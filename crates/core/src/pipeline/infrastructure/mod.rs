pub mod capture_thread;

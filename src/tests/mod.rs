//! End-to-end tests: HTTP request in, platform API calls out.

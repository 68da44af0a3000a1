pub mod csp;

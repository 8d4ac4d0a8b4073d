// Integration tests against a live RabbitMQ.
// Ignored by default; run with `cargo test -- --ignored` once a broker is up.

mod sender_test;

// cc-test-utils: shared test client for the CoolCache integration suites.
//
// A thin RESP client over a plain TcpStream: send a command as an array of
// bulk strings, read back one decoded frame.  Kept deliberately dumber than
// the production codec path so tests exercise the server, not the helper.

pub mod resp_client;

pub use resp_client::TestClient;

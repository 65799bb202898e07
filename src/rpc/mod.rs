/// JSON-RPC bridge to the host page.
pub mod web_rpc;

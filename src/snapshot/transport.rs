use crate::client::RespClient;
use crate::prelude::*;
use async_trait::async_trait;
use resp_wire::Value;

/// Executes one graph command and waits for its reply.
#[async_trait]
pub trait GraphTransport {
    async fn execute(&mut self, args: &[String]) -> Result<Value>;
}

#[async_trait]
impl GraphTransport for RespClient {
    async fn execute(&mut self, args: &[String]) -> Result<Value> {
        let command = args.first().map(String::as_str).unwrap_or_default();
        let reply = self
            .send(args)
            .await
            .with_context(|| format!("{command} failed"))?;
        Ok(reply)
    }
}

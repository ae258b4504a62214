//! tunroute gateway - show the default gateway.

use std::net::Ipv4Addr;

use clap::Args;
use tunlink::Result;
use tunlink::route::{DEFAULT_PROBE, resolve_default_gateway_with_probe};

use crate::GlobalOpts;

#[derive(Args)]
pub struct GatewayCmd {
    /// Destination whose route is looked up.
    #[arg(long, default_value_t = DEFAULT_PROBE)]
    probe: Ipv4Addr,
}

impl GatewayCmd {
    pub async fn run(self, opts: &GlobalOpts) -> Result<()> {
        let conn = super::connection(opts)?;
        let gateway = resolve_default_gateway_with_probe(&conn, self.probe).await?;

        if opts.json {
            let value = serde_json::json!({
                "gateway": gateway,
                "probe": self.probe,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("default via {}", gateway);
        }
        Ok(())
    }
}

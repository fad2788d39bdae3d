use std::time::Instant;

use anyhow::Result;
use octofhir_kv::KvClient;

use crate::output::{print_field, print_success, print_warning};

pub async fn ping(client: &KvClient) -> Result<()> {
    let started = Instant::now();
    client.ping().await?;
    print_success(&format!(
        "{} store reachable in {} ms",
        client.backend(),
        started.elapsed().as_millis()
    ));
    print_field("Namespace", client.namespace());
    if client.backend() == "memory" {
        print_warning("in-process store: state is not shared with other instances");
    }
    Ok(())
}

use anyhow::Result;
use colored::Colorize;
use octofhir_ratelimit::{Admission, RateLimitDecision, RateLimitService, RateLimiter};

use crate::cli::LimitCommand;
use crate::output::{print_field, print_success, print_warning};

pub async fn run(service: &RateLimitService, command: LimitCommand) -> Result<()> {
    match command {
        LimitCommand::Check(args) => check(service, &args.identity, args.cost).await,
        LimitCommand::Status(args) => {
            let remaining = service.remaining(&args.identity).await?;
            print_field("Key", service.key_for(&args.identity));
            print_field("Limit", service.limiter().limit());
            print_field("Remaining", remaining);
            Ok(())
        }
        LimitCommand::Reset(args) => {
            service.reset(&args.identity).await?;
            print_success(&format!("Reset {}", service.key_for(&args.identity)));
            Ok(())
        }
    }
}

async fn check(service: &RateLimitService, identity: &str, cost: u64) -> Result<()> {
    if !service.is_enabled() {
        print_warning("rate limiting is disabled; the middleware admits every request");
    }
    print_field("Key", service.key_for(identity));
    match service.evaluate_n(identity, cost).await? {
        Admission::Allowed(decision) => {
            println!("{}", "allowed".green());
            print_decision(&decision);
        }
        Admission::Rejected(decision) => {
            println!("{}", "rejected".red());
            print_decision(&decision);
        }
        Admission::Degraded { policy, error } => {
            print_warning(&format!("store unavailable: {error}"));
            let verdict = if policy.admits() {
                "allowed".yellow()
            } else {
                "rejected".yellow()
            };
            println!("{verdict} (failure policy: {})", policy.as_str());
        }
    }
    Ok(())
}

fn print_decision(decision: &RateLimitDecision) {
    print_field("Limit", decision.limit);
    print_field("Remaining", decision.remaining);
    if let Some(retry_after) = decision.retry_after {
        print_field("Retry after", format!("{} ms", retry_after.as_millis()));
    }
}

use clap::{Parser, Subcommand};

/// `subrelay` - agent job orchestration and Lightning settlement backend.
#[derive(Parser, Debug)]
#[command(name = "subrelay")]
#[command(version)]
#[command(about = "Agent job orchestration and settlement backend.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway and the alert generator until Ctrl-C
    Serve,

    /// Run only the HTTP gateway
    Gateway {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Inspect and repair jobs
    Jobs {
        #[command(subcommand)]
        jobs_command: JobsCommands,
    },

    /// Run or list operator alerts
    Alerts {
        #[command(subcommand)]
        alerts_command: AlertsCommands,
    },

    /// Print the agent authentication headers for a request
    Sign {
        /// HTTP method (GET, POST)
        method: String,
        /// Request path without query string
        path: String,
        /// Exact request body
        #[arg(long, default_value = "")]
        body: String,
    },
}

/// Job subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum JobsCommands {
    /// List jobs stuck past their status threshold
    Stuck,
    /// Settle a job's payment
    Settle {
        /// Job ID
        id: String,
    },
    /// Record that the user did not pay for a completed action
    Renege {
        /// Job ID
        id: String,
    },
    /// Override a job's status (audited)
    ForceStatus {
        /// Job ID
        id: String,
        /// Target status (e.g. failed, completed_paid)
        status: String,
        /// Why the override is needed
        #[arg(long)]
        reason: String,
    },
    /// Show a job's status history
    History {
        /// Job ID
        id: String,
    },
}

/// Alert subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AlertsCommands {
    /// Run the stuck-job, capacity and debt checks once
    Run,
    /// List unacknowledged alerts
    List,
    /// Acknowledge an alert
    Ack {
        /// Alert ID
        id: i64,
    },
}

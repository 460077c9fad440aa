use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "tracker-provisioner")]
#[command(about = "Register GPS trackers with the backend and configure them over SMS")]
pub struct CliArgs {
    #[arg(short, long, default_value = "provisioner.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 註冊並設定一台追蹤器；收到的簡訊從 stdin 讀取 (`<address> <body>`)
    Provision {
        #[arg(long, help = "Tracker IMEI (12 or 15 digits)")]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long, help = "Tracker SIM number (8 digits, optional +45 prefix)")]
        phone: String,

        #[arg(long)]
        model: String,

        #[arg(long, help = "Wait until the tracker reports connected")]
        confirm_connectivity: bool,

        #[arg(long, help = "Do not wait for SMS acknowledgments")]
        no_wait_for_ack: bool,
    },

    /// 列出可佈建的型號
    Models,

    /// 顯示目前 API key 所屬的使用者
    Whoami,
}

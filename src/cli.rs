// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keydiald")]
#[command(author, version, about = "Huion Keydial Mini Linux driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Control socket path (overrides config and default)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the driver daemon (default when no subcommand is given)
    Run,

    /// Bind a button, combo, or dial direction to an action
    ///
    /// KEY is a button token (BUTTON_1), a +-joined combo
    /// (BUTTON_1+BUTTON_2, order irrelevant), or DIAL_CW/DIAL_CCW/DIAL_CLICK.
    /// ACTION is a key combo (KEY_LEFTCTRL+KEY_C), a mouse action
    /// (mouse:left_click, mouse:scroll, mouse:move 10 0), or a sticky
    /// binding (sticky:KEY_LEFTSHIFT).
    #[command(visible_alias = "b")]
    Bind {
        /// Key spec (e.g. BUTTON_1, BUTTON_1+BUTTON_2, DIAL_CW)
        key: String,
        /// Action spec (e.g. KEY_F1, KEY_LEFTCTRL+KEY_C, mouse:left_click)
        action: String,
    },

    /// Remove a binding
    #[command(visible_alias = "u")]
    Unbind {
        /// Key spec of the binding to remove
        key: String,
    },

    /// List current bindings
    #[command(visible_aliases = ["list", "ls"])]
    Bindings,

    /// List supported key names
    Keys,

    /// Set the Bluetooth device address the daemon attaches to
    SetDevice {
        /// MAC address (AA:BB:CC:DD:EE:FF)
        address: String,
    },

    /// Clear the device address (attach to the first matching device)
    ClearDevice,
}

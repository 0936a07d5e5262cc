use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wordtagger")]
#[command(about = "Tag words and phrases, organised in layers, stored as plain JSON", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the storage root
    Root {
        #[command(subcommand)]
        action: RootAction,
    },

    /// Add an entry (tags on an existing entry are merged)
    #[command(alias = "a")]
    Add {
        /// Text of the entry
        text: String,

        /// Pronunciation
        #[arg(short, long)]
        phonetic: Option<String>,

        /// Meaning or translation
        #[arg(short, long)]
        meaning: Option<String>,

        /// Layer name (defaults to the active layer)
        #[arg(short, long)]
        layer: Option<String>,

        /// Tag as kind:value, or location:name@lat,lon (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Edit an entry's text, pronunciation or meaning
    #[command(alias = "e")]
    Edit {
        /// Current text of the entry
        text: String,

        /// New text
        #[arg(long = "text")]
        new_text: Option<String>,

        /// New pronunciation (empty to clear)
        #[arg(short, long)]
        phonetic: Option<String>,

        /// New meaning (empty to clear)
        #[arg(short, long)]
        meaning: Option<String>,
    },

    /// Replace an entry's tags: `tag <entry> <kind> <value...> ...`
    #[command(alias = "t")]
    Tag {
        /// The tag line
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        line: Vec<String>,
    },

    /// Remove one tag from an entry
    Untag {
        /// Text of the entry
        text: String,

        /// Tag as kind:value
        tag: String,
    },

    /// Move an entry to another layer
    Move {
        /// Text of the entry
        text: String,

        /// Target layer name
        layer: String,
    },

    /// List entries
    #[command(alias = "ls")]
    List {
        /// Only entries in this layer
        #[arg(short, long)]
        layer: Option<String>,
    },

    /// Ranked search over text, meaning, pronunciation and tags
    #[command(alias = "s")]
    Search {
        /// Search query
        query: String,
    },

    /// Suggest tags from the active layer
    Tags {
        /// Filter (empty lists every tag)
        #[arg(default_value = "")]
        query: String,
    },

    /// Delete an entry
    #[command(alias = "rm")]
    Delete {
        /// Text of the entry
        text: String,
    },

    /// Manage layers
    Layer {
        #[command(subcommand)]
        action: LayerAction,
    },

    /// Manage custom tag kinds
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Move entries without a valid layer to the current layer
    Repair,

    /// Save now
    Save,

    /// Re-read everything from the storage root
    Reload,

    /// Show root, sync state and counts
    Status,

    /// Delete every entry, layer and backup under the root
    ClearAll {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RootAction {
    /// Use a directory as the storage root
    Set { path: PathBuf },
    /// Detach from the storage root
    Clear,
    /// Print the storage root
    Show,
}

#[derive(Subcommand, Debug)]
pub enum LayerAction {
    /// List layers
    List,
    /// Add a layer
    Add {
        /// Machine name, no whitespace
        name: String,
        /// Display name
        #[arg(short, long)]
        display: Option<String>,
        /// Color, e.g. #4A90D9
        #[arg(short, long)]
        color: Option<String>,
    },
    /// Change a layer's display name
    Rename { name: String, display: String },
    /// Make a layer the active one
    Activate { name: String },
    /// Delete a layer and every entry in it
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum MappingAction {
    /// List custom tag kinds
    List,
    /// Add or rename a custom tag kind
    Add { key: String, display: String },
    /// Remove a custom tag kind
    Remove { key: String },
    /// Restore the default custom tag kinds
    Reset,
}

use chrono::Utc;
use clap::Parser;
use colored::*;
use unicode_width::UnicodeWidthStr;
use wordtagger::api::StoreStatus;
use wordtagger::commands::nodes::{NewNode, NodeUpdate};
use wordtagger::commands::{CmdMessage, CmdResult, MessageLevel};
use wordtagger::error::{Result, WordTaggerError};
use wordtagger::init::{config_dir, initialize, AppContext};
use wordtagger::logging::init_logging;
use wordtagger::model::{Layer, Node};
use wordtagger::search::SearchHit;
use wordtagger::store::AccessMode;
use wordtagger::sync::SyncStatus;

mod args;
use args::{Cli, Commands, LayerAction, MappingAction, RootAction};

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut ctx = initialize(&config_dir()?)?;
    if let Some(e) = &ctx.startup_error {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }

    let outcome = dispatch(&mut ctx, cli.command);

    // Drains the debounce window so nothing typed in this run is lost.
    ctx.api.shutdown();
    let status = ctx.api.status();
    if let (SyncStatus::Failed(_), Some(e)) = (&status.sync_status, &status.last_error) {
        eprintln!("{} changes were not saved: {}", "Warning:".yellow(), e);
    }

    outcome
}

fn dispatch(ctx: &mut AppContext, command: Option<Commands>) -> Result<()> {
    match command {
        Some(Commands::Root { action }) => handle_root(ctx, action),
        Some(Commands::Add {
            text,
            phonetic,
            meaning,
            layer,
            tags,
        }) => handle_add(ctx, text, phonetic, meaning, layer, tags),
        Some(Commands::Edit {
            text,
            new_text,
            phonetic,
            meaning,
        }) => handle_edit(ctx, &text, new_text, phonetic, meaning),
        Some(Commands::Tag { line }) => {
            let result = ctx.api.apply_tag_line_by_text(&line.join(" "))?;
            print_messages(&result.messages);
            Ok(())
        }
        Some(Commands::Untag { text, tag }) => handle_untag(ctx, &text, &tag),
        Some(Commands::Move { text, layer }) => {
            let node = require_node(ctx, &text)?;
            let layer = ctx.api.find_layer(&layer)?;
            let result = ctx.api.move_node_to_layer(node.id, layer.id)?;
            print_messages(&result.messages);
            Ok(())
        }
        Some(Commands::List { layer }) => handle_list(ctx, layer),
        Some(Commands::Search { query }) => {
            print_hits(&ctx.api.search(&query));
            Ok(())
        }
        Some(Commands::Tags { query }) => {
            let tags = ctx.api.relevant_tags(&query);
            if tags.is_empty() {
                println!("{}", "No tags".dimmed());
            }
            for tag in tags {
                println!("  {}", tag.label().cyan());
            }
            Ok(())
        }
        Some(Commands::Delete { text }) => {
            let node = require_node(ctx, &text)?;
            let result = ctx.api.delete_node(node.id)?;
            print_messages(&result.messages);
            Ok(())
        }
        Some(Commands::Layer { action }) => handle_layer(ctx, action),
        Some(Commands::Mapping { action }) => handle_mapping(ctx, action),
        Some(Commands::Repair) => {
            let result = ctx.api.repair_orphans()?;
            print_messages(&result.messages);
            Ok(())
        }
        Some(Commands::Save) => {
            let report = ctx.api.force_save()?;
            println!(
                "{}",
                format!("Saved to {}", report.root.display()).green()
            );
            if let Some(backup) = report.backup {
                println!("{}", format!("Backup {}", backup.display()).dimmed());
            }
            if report.pruned_backups > 0 {
                println!(
                    "{}",
                    format!("Pruned {} old backup(s)", report.pruned_backups).dimmed()
                );
            }
            Ok(())
        }
        Some(Commands::Reload) => {
            ctx.api.force_reload()?;
            print_status(&ctx.api.status());
            Ok(())
        }
        Some(Commands::Status) => {
            print_status(&ctx.api.status());
            Ok(())
        }
        Some(Commands::ClearAll { yes }) => {
            if !yes {
                return Err(WordTaggerError::InvalidInput(
                    "clear-all deletes every entry and backup; pass --yes to confirm".to_string(),
                ));
            }
            ctx.api.clear_all_data()?;
            println!("{}", "Cleared all data".green());
            Ok(())
        }
        None => handle_list(ctx, None),
    }
}

fn handle_root(ctx: &mut AppContext, action: RootAction) -> Result<()> {
    match action {
        RootAction::Set { path } => {
            ctx.api.select_root(&path)?;
            ctx.remember_root()?;
            let status = ctx.api.status();
            if let Some(root) = &status.current_root {
                println!("{}", format!("Using {}", root.display()).green());
            }
            println!(
                "{}",
                format!("{} layer(s), {} entries", status.layers, status.nodes).dimmed()
            );
        }
        RootAction::Clear => {
            ctx.api.clear_root()?;
            ctx.remember_root()?;
            println!("{}", "Storage root cleared".green());
        }
        RootAction::Show => match ctx.api.status().current_root {
            Some(root) => println!("{}", root.display()),
            None => println!("{}", "No storage root selected".dimmed()),
        },
    }
    Ok(())
}

fn handle_add(
    ctx: &mut AppContext,
    text: String,
    phonetic: Option<String>,
    meaning: Option<String>,
    layer: Option<String>,
    tag_specs: Vec<String>,
) -> Result<()> {
    let tags = tag_specs
        .iter()
        .map(|spec| {
            let (kind, value) = split_tag_spec(spec)?;
            ctx.api.build_tag(kind, value)
        })
        .collect::<Result<Vec<_>>>()?;

    let layer_id = match layer {
        Some(name) => Some(ctx.api.find_layer(&name)?.id),
        None => None,
    };

    let new = NewNode {
        text,
        phonetic,
        meaning,
        layer_id,
        tags,
    };
    let result = ctx.api.add_node(new)?;
    print_messages(&result.messages);
    Ok(())
}

fn handle_edit(
    ctx: &mut AppContext,
    text: &str,
    new_text: Option<String>,
    phonetic: Option<String>,
    meaning: Option<String>,
) -> Result<()> {
    let node = require_node(ctx, text)?;
    let changes = NodeUpdate {
        text: new_text,
        phonetic: phonetic.map(Some),
        meaning: meaning.map(Some),
    };
    let result = ctx.api.update_node(node.id, changes)?;
    print_messages(&result.messages);
    Ok(())
}

fn handle_untag(ctx: &mut AppContext, text: &str, spec: &str) -> Result<()> {
    let node = require_node(ctx, text)?;
    let (kind, value) = split_tag_spec(spec)?;
    let kind = ctx
        .api
        .resolve_kind(kind)
        .ok_or_else(|| WordTaggerError::InvalidInput(format!("unknown tag kind '{}'", kind)))?;
    let result = ctx.api.remove_tag(node.id, &kind, value)?;
    print_messages(&result.messages);
    Ok(())
}

fn handle_list(ctx: &mut AppContext, layer: Option<String>) -> Result<()> {
    let layer_id = match layer {
        Some(name) => Some(ctx.api.find_layer(&name)?.id),
        None => None,
    };
    let result = ctx.api.list_nodes(layer_id)?;
    print_nodes(&result.listed_nodes);
    print_messages(&result.messages);
    Ok(())
}

fn handle_layer(ctx: &mut AppContext, action: LayerAction) -> Result<()> {
    let result: CmdResult = match action {
        LayerAction::List => {
            let result = ctx.api.list_layers()?;
            print_layers(&result.listed_layers);
            result
        }
        LayerAction::Add {
            name,
            display,
            color,
        } => ctx
            .api
            .add_layer(&name, display.as_deref(), color.as_deref())?,
        LayerAction::Rename { name, display } => {
            let layer = ctx.api.find_layer(&name)?;
            ctx.api.rename_layer(layer.id, &display)?
        }
        LayerAction::Activate { name } => {
            let layer = ctx.api.find_layer(&name)?;
            ctx.api.activate_layer(layer.id)?
        }
        LayerAction::Delete { name } => {
            let layer = ctx.api.find_layer(&name)?;
            ctx.api.delete_layer(layer.id)?
        }
    };
    print_messages(&result.messages);
    Ok(())
}

fn handle_mapping(ctx: &mut AppContext, action: MappingAction) -> Result<()> {
    let result = match action {
        MappingAction::List => ctx.api.list_mappings()?,
        MappingAction::Add { key, display } => ctx.api.add_mapping(&key, &display)?,
        MappingAction::Remove { key } => ctx.api.remove_mapping(&key)?,
        MappingAction::Reset => ctx.api.reset_mappings()?,
    };
    print_messages(&result.messages);
    Ok(())
}

fn require_node(ctx: &AppContext, text: &str) -> Result<Node> {
    ctx.api
        .find_node(text)
        .ok_or_else(|| WordTaggerError::InvalidInput(format!("no entry '{}'", text.trim())))
}

/// `kind:value` into its halves.
fn split_tag_spec(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once(':') {
        Some((kind, value)) if !kind.trim().is_empty() && !value.trim().is_empty() => {
            Ok((kind.trim(), value.trim()))
        }
        _ => Err(WordTaggerError::InvalidInput(format!(
            "expected kind:value, got '{}'",
            spec
        ))),
    }
}

fn print_messages(messages: &[CmdMessage]) {
    for message in messages {
        match message.level {
            MessageLevel::Info => println!("{}", message.content.dimmed()),
            MessageLevel::Success => println!("{}", message.content.green()),
            MessageLevel::Warning => println!("{}", message.content.yellow()),
        }
    }
}

const TEXT_WIDTH: usize = 24;
const TIME_WIDTH: usize = 14;

fn print_nodes(nodes: &[Node]) {
    for node in nodes {
        println!("{}", format_node_line(node));
    }
}

fn format_node_line(node: &Node) -> String {
    let padding = TEXT_WIDTH.saturating_sub(node.text.width());
    let mut line = format!("  {}{}", node.text.bold(), " ".repeat(padding));

    if let Some(phonetic) = &node.phonetic {
        line.push_str(&format!(" {}", format!("/{}/", phonetic).dimmed()));
    }
    if let Some(meaning) = &node.meaning {
        line.push_str(&format!(" {}", meaning));
    }
    for tag in &node.tags {
        line.push_str(&format!(" {}", tag.label().cyan()));
    }
    line.push_str(&format!(" {}", format_time_ago(node.updated_at).dimmed()));
    line
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("{}", "No matches".dimmed());
        return;
    }
    for hit in hits {
        println!(
            "{} {}",
            format!("{:>5.2}", hit.score).yellow(),
            format_node_line(&hit.node).trim_start()
        );
    }
}

fn print_layers(layers: &[Layer]) {
    for layer in layers {
        let marker = if layer.is_active { "*" } else { " " };
        println!(
            "{} {:<16} {} {}",
            marker.green(),
            layer.name,
            layer.display_name,
            layer.color.dimmed()
        );
    }
}

fn print_status(status: &StoreStatus) {
    match &status.current_root {
        Some(root) => {
            let mode = match status.access_mode {
                Some(AccessMode::ReadOnly) => " (read-only)".yellow(),
                _ => "".normal(),
            };
            println!("root:      {}{}", root.display(), mode);
        }
        None => println!("root:      {}", "none".dimmed()),
    }
    let sync = match &status.sync_status {
        SyncStatus::Idle => "idle".normal(),
        SyncStatus::Syncing => "syncing".cyan(),
        SyncStatus::Success => "saved".green(),
        SyncStatus::Failed(reason) => format!("failed ({})", reason).red(),
    };
    println!("sync:      {}", sync);
    if let Some(at) = status.last_sync_time {
        println!("last sync: {}", format_time_ago(at).trim_start());
    }
    if let Some(e) = &status.last_error {
        println!("error:     {}", e.red());
    }
    println!("layers:    {}", status.layers);
    println!("entries:   {}", status.nodes);
}

fn format_time_ago(timestamp: chrono::DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    let formatter = timeago::Formatter::new();
    let time_str = formatter.convert(duration.to_std().unwrap_or_default());
    format!("{:>width$}", time_str, width = TIME_WIDTH)
}

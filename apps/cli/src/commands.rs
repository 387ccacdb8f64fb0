use std::path::PathBuf;

use chrono::NaiveDate;
use gist_sync::{Container, PullStats, PushStats, PushStatus};
use usage_app::{AppError, AppState, AppStatus, Result};

use crate::args::{Command, backup_override};

pub fn dispatch(app: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Push {
            all,
            force,
            backup,
            no_backup,
        } => push(app, all, force, backup_override(backup, no_backup)),
        Command::Pull { machines } => pull(app, machines),
        Command::Status => status(app),
        Command::Info => info(app),
        Command::SetToken { token } => {
            app.services.tokens.set_token(&token)?;
            println!(
                "Token saved to {}.",
                app.services.tokens.token_path().display()
            );
            Ok(())
        }
        Command::DeleteToken => {
            if app.services.tokens.delete_token()? {
                println!("Token removed.");
            } else {
                println!("No stored token.");
            }
            Ok(())
        }
        Command::Export { output, since } => export(app, output, since),
        Command::Import {
            files,
            machine,
            dry_run,
        } => import(app, files, machine, dry_run),
        Command::Machines { all } => machines(app, all),
    }
}

fn push(app: &AppState, all: bool, force: bool, backup: Option<bool>) -> Result<()> {
    let sync = &app.services.sync;
    let stats = sync.push(sync.push_options(all, force, backup))?;
    print_push(&stats);
    Ok(())
}

fn print_push(stats: &PushStats) {
    if stats.status == PushStatus::NothingToSync {
        println!("Nothing to sync.");
        return;
    }
    println!("Pushed {} records.", stats.exported_records);
    if let Some(id) = &stats.container_id {
        println!("  container: {id}");
    }
    println!(
        "  files: {} uploaded, {} removed{}",
        stats.files_uploaded,
        stats.files_deleted,
        if stats.chunked { " (chunked)" } else { "" }
    );
    if stats.conflicts_resolved {
        println!("  merged concurrent changes from other machines");
    }
    if stats.backup_created {
        println!("  backup created");
    }
    if stats.backups_deleted > 0 {
        println!("  expired backups removed: {}", stats.backups_deleted);
    }
}

fn pull(app: &AppState, machines: Vec<String>) -> Result<()> {
    let filter = (!machines.is_empty()).then_some(machines.as_slice());
    let stats = app.services.sync.pull(filter)?;
    print_pull(&stats);
    Ok(())
}

fn print_pull(stats: &PullStats) {
    if stats.container_id.is_none() {
        println!("No remote container found. Push from a machine first.");
        return;
    }
    for machine in &stats.machines {
        println!(
            "{}: {} new, {} duplicate, {} errors ({} files, {} failed)",
            machine.machine_name,
            machine.stats.new_records,
            machine.stats.duplicate_records,
            machine.stats.errors,
            machine.files,
            machine.files_failed
        );
    }
    for skipped in &stats.skipped_machines {
        println!("{skipped}: skipped");
    }
    println!(
        "Pulled {} machines: {} new, {} duplicate, {} errors.",
        stats.machines_pulled,
        stats.totals.new_records,
        stats.totals.duplicate_records,
        stats.totals.errors
    );
}

fn status(app: &AppState) -> Result<()> {
    let status = app.services.sync.status()?;
    print_status(&status);
    Ok(())
}

fn print_status(status: &AppStatus) {
    let sync = &status.sync;
    println!("Token: {}", status.token);
    println!("Machine: {}", sync.machine_name);
    println!(
        "Container: {}",
        sync.container_id.as_deref().unwrap_or("none")
    );
    match sync.last_local_export {
        Some(date) => println!("Last export: {date}"),
        None => println!("Last export: never"),
    }
    if let Some(remote) = &sync.remote {
        if let Some(url) = &remote.container_url {
            println!("URL: {url}");
        }
        if let Some(last_sync) = remote.machine_last_sync {
            println!("Last push from this machine: {}", last_sync.to_rfc3339());
        }
        if let Some(stats) = &remote.manifest {
            println!(
                "Remote: {} machines, {} records, {} backups (kept {} days)",
                stats.total_machines, stats.total_records, stats.total_backups, stats.retention_days
            );
            if let Some(newest) = stats.newest_sync {
                println!("Newest push: {}", newest.to_rfc3339());
            }
        }
    }
    if let Some(err) = &sync.remote_error {
        println!("Remote unavailable: {err}");
    }
}

fn info(app: &AppState) -> Result<()> {
    match app.services.sync.container_info()? {
        Some(container) => print_info(&container),
        None => println!("No remote container found. Push from a machine first."),
    }
    Ok(())
}

fn print_info(container: &Container) {
    println!("Container: {}", container.id);
    println!("Description: {}", container.description);
    if let Some(url) = &container.url {
        println!("URL: {url}");
    }
    if let Some(created) = container.created_at {
        println!("Created: {}", created.to_rfc3339());
    }
    if let Some(updated) = container.updated_at {
        println!("Updated: {}", updated.to_rfc3339());
    }
    println!("Files:");
    for file in &container.files {
        match file.size {
            Some(size) => println!("  {}  {}", file.name, format_size(size)),
            None => println!("  {}", file.name),
        }
    }
    println!(
        "{} files, {} total",
        container.files.len(),
        format_size(container.total_size())
    );
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn export(app: &AppState, output: PathBuf, since: Option<NaiveDate>) -> Result<()> {
    let summary = app.services.sync.export_to_file(&output, since)?;
    println!(
        "Exported {} records from {} to {}.",
        summary.records,
        summary.machine_name,
        summary.path.display()
    );
    Ok(())
}

fn import(
    app: &AppState,
    files: Vec<PathBuf>,
    machine: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let report = app
        .services
        .sync
        .import_files(&files, machine.as_deref(), dry_run);
    for file in &report.files {
        match &file.result {
            Ok(stats) => println!(
                "{}: {} new, {} duplicate, {} errors",
                file.path.display(),
                stats.new_records,
                stats.duplicate_records,
                stats.errors
            ),
            Err(err) => println!("{}: failed: {err}", file.path.display()),
        }
    }
    let verb = if dry_run { "Would import" } else { "Imported" };
    println!(
        "{verb} {} new records ({} duplicate, {} errors).",
        report.totals.new_records, report.totals.duplicate_records, report.totals.errors
    );
    let failed = report.files_failed();
    if failed > 0 {
        return Err(AppError::Message(format!(
            "{failed} of {} files failed to import",
            report.files.len()
        )));
    }
    Ok(())
}

fn machines(app: &AppState, include_inactive: bool) -> Result<()> {
    let machines = app.services.sync.machines(include_inactive)?;
    if machines.is_empty() {
        println!("No machines imported yet.");
        return Ok(());
    }
    for machine in machines {
        println!(
            "{}{}  last seen {}",
            machine.machine_name,
            if machine.active { "" } else { " (inactive)" },
            machine.last_seen
        );
    }
    Ok(())
}

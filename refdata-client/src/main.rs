//! Точка входа `refdata-client`.
//!
//! Команды:
//! - `parse`  — разбор файла ответа, печать сырых или типизированных записей
//! - `pack`   — нарезка файла ответа на фрагменты и запись файла захвата
//! - `replay` — запрос через полноценную сессию, которая отвечает из файла захвата
//!
//! `Ctrl+C` ставит флаг остановки; `replay` перестаёт ждать ответ.

mod cli;
mod identifiers;
mod offline;
mod replay;

use std::io;
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use clap::Parser;
use log::info;

use crate::cli::Command;

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/trace
    env_logger::init();

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    let args = cli::Args::parse();
    let mut stdout = io::stdout().lock();

    match &args.command {
        Command::Parse(a) => {
            cli::require_file(&a.file, "--file")?;
            offline::run_parse(a, &mut stdout)
        }
        Command::Pack(a) => {
            cli::require_file(&a.file, "--file")?;
            offline::run_pack(a)
        }
        Command::Replay(a) => {
            a.validate()?;
            info!(
                "Starting replay: capture={:?}, service={}, timeout_ms={}",
                a.capture, a.service, a.timeout_ms
            );
            replay::run_replay(a, shutdown, &mut stdout)
        }
    }
}

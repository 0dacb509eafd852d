use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand};

/// Refdata Client - разбор ответов сервиса справочных данных и воспроизведение записанных сессий.
#[derive(Parser, Debug, Clone)]
#[command(name = "refdata-client", version, about)]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Разобрать файл ответа и напечатать записи
    Parse(ParseArgs),
    /// Нарезать файл ответа на фрагменты и записать файл захвата
    Pack(PackArgs),
    /// Прогнать запрос через сессию, которая отвечает из файла захвата
    Replay(ReplayArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub(crate) struct ParseArgs {
    /// Файл ответа (START-OF-FILE ... END-OF-FILE)
    #[arg(long)]
    pub(crate) file: PathBuf,

    /// Печатать типизированные значения вместо сырых строк
    #[arg(long)]
    pub(crate) typed: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub(crate) struct PackArgs {
    /// Файл ответа
    #[arg(long)]
    pub(crate) file: PathBuf,

    /// Куда записать файл захвата
    #[arg(long)]
    pub(crate) out: PathBuf,

    /// На сколько фрагментов делить ответ (1 = без фрагментации)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub(crate) fragments: u16,
}

#[derive(ClapArgs, Debug, Clone)]
#[command(
    group(
        ArgGroup::new("ids_source")
            .required(true)
            .args(["ids_file", "ids"])
    )
)]
pub(crate) struct ReplayArgs {
    /// Файл захвата, записанный командой `pack`
    #[arg(long)]
    pub(crate) capture: PathBuf,

    /// Идентификаторы строкой, например: "IBM US Equity, AAPL US Equity".
    /// Нельзя вместе с --ids-file
    #[arg(long, conflicts_with = "ids_file")]
    pub(crate) ids: Option<String>,

    /// Файл идентификаторов (по одному на строку). Нельзя вместе с --ids
    #[arg(long, conflicts_with = "ids")]
    pub(crate) ids_file: Option<PathBuf>,

    /// Поля через запятую, например: "PX_LAST,NAME"
    #[arg(long)]
    pub(crate) fields: String,

    /// Переопределение поля FIELD=VALUE (можно несколько раз)
    #[arg(long = "override", value_name = "FIELD=VALUE")]
    pub(crate) overrides: Vec<String>,

    /// Сколько ждать ответ, мс
    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) timeout_ms: u64,

    /// Имя сервиса
    #[arg(long, default_value = refdata_session::config::DEFAULT_SERVICE)]
    pub(crate) service: String,
}

impl ReplayArgs {
    /// Валидация аргументов (файлы существуют, переопределения вида FIELD=VALUE)
    pub(crate) fn validate(&self) -> Result<()> {
        require_file(&self.capture, "--capture")?;
        if let Some(path) = &self.ids_file {
            require_file(path, "--ids-file")?;
        }
        if self.fields.trim().is_empty() {
            bail!("--fields is empty");
        }
        for o in &self.overrides {
            if !o.contains('=') {
                bail!("--override must look like FIELD=VALUE (got: {o})");
            }
        }
        Ok(())
    }

    pub(crate) fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides.iter().filter_map(|o| o.split_once('='))
    }
}

pub(crate) fn require_file(path: &PathBuf, flag: &str) -> Result<()> {
    let md = std::fs::metadata(path).with_context(|| format!("{flag}: file not found: {:?}", path))?;
    if !md.is_file() {
        bail!("{flag} must point to a file: {:?}", path);
    }
    Ok(())
}

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use anyhow::Context;
use log::info;
use refdata_core::parser::parse_reader;
use refdata_core::wire::{split_response, write_capture};

use crate::cli::{PackArgs, ParseArgs};

// parse: файл ответа -> записи в stdout
pub(crate) fn run_parse(args: &ParseArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let f = File::open(&args.file).with_context(|| format!("open {:?}", args.file))?;
    let doc = parse_reader(BufReader::new(f)).with_context(|| format!("parse {:?}", args.file))?;

    info!(
        "parsed {:?}: {} field(s), {} entr(ies), history={}",
        args.file,
        doc.fields().len(),
        doc.entries().len(),
        doc.is_history()
    );

    if args.typed {
        let typed = doc.to_typed().context("decode field values")?;
        for r in &typed.records {
            writeln!(out, "{r}")?;
        }
    } else {
        for e in doc.entries() {
            writeln!(out, "{e}")?;
        }
    }
    Ok(())
}

// pack: файл ответа -> файл захвата из N фрагментов
pub(crate) fn run_pack(args: &PackArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file).with_context(|| format!("read {:?}", args.file))?;
    let frames = split_response(&text, usize::from(args.fragments));

    let out = File::create(&args.out).with_context(|| format!("create {:?}", args.out))?;
    write_capture(BufWriter::new(out), &frames).context("write capture")?;

    info!("wrote {} frame(s) to {:?}", frames.len(), args.out);
    Ok(())
}

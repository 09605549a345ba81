use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use pianogan::{
    Args, DatasetAssembler, NoteStats, ShuffleMode, extract_corpus, note_name, render_waveform,
    scan_corpus, write_midi_file, write_wav,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.seq_length == 0 {
        bail!("--seq-length must be greater than 0..!");
    }
    if args.batch_size == 0 {
        bail!("--batch-size must be greater than 0..!");
    }

    info!("Scanning '{}' for MIDI files...", args.data_dir.display());
    let paths = scan_corpus(&args.data_dir, args.max_files);
    if paths.is_empty() {
        bail!(
            "No .mid/.midi files found under '{}'..!",
            args.data_dir.display()
        );
    }
    info!("Number of files: {}", paths.len());

    let notes = extract_corpus(&paths);
    if notes.is_empty() {
        bail!("No notes extracted from the corpus..!");
    }
    info!("Number of notes extracted: {}", notes.len());

    if args.dry_run {
        info!("Previewing at most {} notes..!", args.dry_run_max);
        for (i, event) in notes.events().iter().take(args.dry_run_max).enumerate() {
            info!(
                "Note {}: pitch={} ({}) step={:.4}s duration={:.4}s",
                i,
                event.pitch,
                note_name(event.pitch),
                event.step,
                event.duration
            );
        }
        return Ok(());
    }

    if let Some(stats_path) = &args.stats_out
        && let Some(stats) = NoteStats::from_table(&notes)
    {
        stats.write_json(stats_path)?;
        info!("Wrote note statistics to '{}'..!", stats_path.display());
    }

    // round-trip the corpus back through the synthesizer as a listening check
    let sample_path = args.output.join("example.mid");
    write_midi_file(&sample_path, &notes.rows(), &args.instrument, args.velocity)?;
    info!("Wrote round-trip MIDI to '{}'..!", sample_path.display());

    if args.render_audio {
        let samples = render_waveform(&notes, args.sample_rate, Some(args.preview_seconds));
        let wav_path = args.output.join("example.wav");
        write_wav(&wav_path, &samples, args.sample_rate)?;
        info!(
            "Rendered a {:.1}s preview to '{}'..!",
            samples.len() as f64 / f64::from(args.sample_rate),
            wav_path.display()
        );
    }

    let shuffle = if args.no_shuffle {
        ShuffleMode::Off
    } else {
        ShuffleMode::Aligned { seed: args.seed }
    };
    let assembler = DatasetAssembler::new(args.seq_length, args.batch_size, shuffle);
    let batches = assembler.batches(&notes)?;
    debug!("Batch stream ready with {} full batch(es)", batches.len());

    let mut batch_count = 0usize;
    for set in batches {
        debug!(
            "Batch {}: pitch {:?}, step {:?}, duration {:?}",
            batch_count,
            set.pitch.inputs.dim(),
            set.step.inputs.dim(),
            set.duration.inputs.dim()
        );
        batch_count += 1;
    }

    if batch_count == 0 {
        warn!(
            "Corpus fills no complete batch of {} windows; add files or lower --batch-size..!",
            args.batch_size
        );
    } else {
        info!(
            "Assembled {} aligned batch(es) of {} x {} per attribute, exiting..!",
            batch_count, args.batch_size, args.seq_length
        );
    }

    Ok(())
}

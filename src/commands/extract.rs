use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use pse_lib::output::{ExtractOutput, SourceDescriptor, SourceKind, PSE_OUTPUT_VERSION};
use pse_lib::progress::ProgressCallback;
use pse_lib::{
    BrowserManager, CapturedPage, Config, ExtractError, HttpFetcher, PseOutput, StyleExtractor,
};

use crate::cli::ExtractArgs;
use crate::formatting::{render_error, write_output};
use crate::settings::{
    format_effective_config, load_config, resolve_extract_settings, ExtractFlagSources,
    ResolvedExtractSettings,
};

/// Run the extract command.
pub async fn run_extract(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    verbose: bool,
    args: ExtractArgs,
) -> ExitCode {
    let format = args.format;
    let output = args.output.clone();

    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    let flags = ExtractFlagSources::from_args(raw_args);
    let settings = resolve_extract_settings(&args, &config, &flags);
    if verbose {
        eprintln!(
            "{}",
            format_effective_config(&settings, &config, config_path.as_deref())
        );
    }

    let progress: Option<ProgressCallback> = if verbose {
        Some(Arc::new(|msg: &str| eprintln!("{msg}")))
    } else {
        None
    };

    let (page, source) = match load_page(&args, &config, &settings, progress.clone()).await {
        Ok(loaded) => loaded,
        Err(err) => return render_error(err, format, output),
    };

    if let Some(path) = &args.save_capture {
        if let Err(err) = page.save(path) {
            return render_error(err, format, output);
        }
        if verbose {
            eprintln!("Capture saved to {}", path.display());
        }
    }

    let extractor = match build_extractor(config, &settings, progress) {
        Ok(extractor) => extractor,
        Err(err) => return render_error(err, format, output),
    };

    let snapshot = match extractor.extract_snapshot(&page).await {
        Ok(snapshot) => snapshot,
        Err(err) => return render_error(err, format, output),
    };

    let body = PseOutput::Extract(ExtractOutput {
        version: PSE_OUTPUT_VERSION.to_string(),
        source,
        capture_path: args.save_capture.clone(),
        snapshot,
    });

    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ExtractError::Config(err.to_string()), format, output);
    }

    ExitCode::SUCCESS
}

async fn load_page(
    args: &ExtractArgs,
    config: &Config,
    settings: &ResolvedExtractSettings,
    progress: Option<ProgressCallback>,
) -> Result<(CapturedPage, SourceDescriptor), ExtractError> {
    if let Some(path) = &args.source.capture {
        if let Some(cb) = &progress {
            cb(&format!("Loading capture {}…", path.display()));
        }
        let page = CapturedPage::load(path).map_err(|err| match err {
            ExtractError::Io(io) => ExtractError::Config(format!(
                "Failed to read capture {}: {}",
                path.display(),
                io
            )),
            other => other,
        })?;
        return Ok((
            page,
            SourceDescriptor {
                kind: SourceKind::Capture,
                value: path.display().to_string(),
            },
        ));
    }

    let url = args
        .source
        .url
        .as_deref()
        .ok_or_else(|| ExtractError::Config("Either --url or --capture is required".to_string()))?;
    let mut options = settings.browser_options(config);
    options.progress = progress;
    let page = BrowserManager::new(options).capture_page(url).await?;
    Ok((
        page,
        SourceDescriptor {
            kind: SourceKind::Url,
            value: url.to_string(),
        },
    ))
}

fn build_extractor(
    config: Config,
    settings: &ResolvedExtractSettings,
    progress: Option<ProgressCallback>,
) -> Result<StyleExtractor, ExtractError> {
    let fetcher = if settings.fetch_enabled {
        Some(HttpFetcher::new(&config.fetch)?)
    } else {
        None
    };

    let mut extractor = StyleExtractor::new(config);
    if let Some(fetcher) = fetcher {
        extractor = extractor.with_fetcher(Arc::new(fetcher));
    }
    if let Some(progress) = progress {
        extractor = extractor.with_progress(progress);
    }
    Ok(extractor)
}

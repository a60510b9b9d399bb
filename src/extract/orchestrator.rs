use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

use super::filter::{
    filter_element, filter_pseudo, parse_px, DefaultStyleCache, FilterContext,
    DEFAULT_ROOT_FONT_SIZE,
};
use super::identifier::identify;
use super::importance::ImportanceRules;
use super::rules::{RuleError, RuleLimits, RuleProcessor};
use super::summary;
use crate::config::Config;
use crate::css::{dedupe_media_queries, parse_stylesheet, CssRule};
use crate::fetch::{fetch_with_timeout, resolve_href, StylesheetFetcher};
use crate::page::{ElementId, Page, PageError, PseudoElement, StyleSource};
use crate::progress::{log_progress, ProgressCallback};
use crate::types::{
    now_millis, ElementStyles, ExtractionStats, IssueKind, PhaseTimings, Snapshot,
    SnapshotMetadata, Viewport,
};
use crate::{ExtractError, Result};

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Fetched bodies that are really HTML error pages.
fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start();
    head.starts_with("<!") || head.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("<html"))
}

fn merge_styles(snapshot: &mut Snapshot, key: String, incoming: ElementStyles) {
    let entry = snapshot.computed_styles.entry(key).or_default();
    entry.styles.extend(incoming.styles);
    for url in incoming.background_image_urls {
        if !entry.background_image_urls.contains(&url) {
            entry.background_image_urls.push(url);
        }
    }
}

/// Runs one extraction pass per call against a [`Page`].
///
/// The extractor holds only configuration. Every call allocates its own
/// [`Snapshot`], default-style cache and rule-processing state, so concurrent
/// extractions never share mutable state.
pub struct StyleExtractor {
    config: Config,
    importance: ImportanceRules,
    fetcher: Option<Arc<dyn StylesheetFetcher>>,
    progress: Option<ProgressCallback>,
}

impl Default for StyleExtractor {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl StyleExtractor {
    pub fn new(config: Config) -> Self {
        Self {
            importance: ImportanceRules::from_config(&config.importance),
            config,
            fetcher: None,
            progress: None,
        }
    }

    /// Enables out-of-band fetching of stylesheets the page cannot read.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn StylesheetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extracts a style snapshot from `page`.
    ///
    /// Only setup failures are returned as errors (as
    /// [`ExtractError::Fatal`]). Everything that goes wrong afterwards is
    /// recorded in [`Snapshot::errors`] and the pass continues.
    pub async fn extract_snapshot<P: Page + ?Sized>(&self, page: &P) -> Result<Snapshot> {
        let started = Instant::now();

        self.config
            .validate()
            .map_err(|e| ExtractError::fatal(format!("invalid extractor configuration: {e}")))?;
        let root = page
            .document_element()
            .ok_or_else(|| ExtractError::fatal("page has no document element"))?;
        let viewport = page.viewport();
        if viewport.is_empty() {
            return Err(ExtractError::fatal(format!(
                "viewport {viewport} has no visible area"
            )));
        }

        let mut snapshot = Snapshot::new(SnapshotMetadata {
            extracted_at: now_millis(),
            url: page.url().map(str::to_string),
            viewport,
            user_agent: page.user_agent().map(str::to_string),
            ..SnapshotMetadata::default()
        });
        let mut stats = ExtractionStats::default();
        tracing::info!(url = page.url().unwrap_or("<capture>"), %viewport, "starting extraction");

        let phase = Instant::now();
        let limits = RuleLimits::from_config(&self.config.limits, &self.config.media);
        let mut processor = RuleProcessor::new(page, &self.importance, limits);
        self.process_stylesheets(page, &mut processor, &mut snapshot, &mut stats)
            .await;
        drop(processor);
        let stylesheets_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let mut defaults = DefaultStyleCache::new();
        let root_font_size = page
            .computed_style(root, None)
            .ok()
            .and_then(|style| style.get("font-size").and_then(parse_px))
            .unwrap_or(DEFAULT_ROOT_FONT_SIZE);
        let ranked = self.rank_candidates(page, viewport, &mut stats);
        log_progress(
            &self.progress,
            &format!("Filtering styles of {} elements...", ranked.len()),
        );
        for (index, batch) in ranked.chunks(self.config.limits.batch_size).enumerate() {
            if index > 0 {
                tokio::task::yield_now().await;
            }
            for &element in batch {
                stats.elements_processed += 1;
                let outcome = self.process_element(
                    page,
                    element,
                    &mut defaults,
                    root_font_size,
                    &mut snapshot,
                    &mut stats,
                );
                if let Err(err) = outcome {
                    snapshot.record_issue(
                        IssueKind::ElementProcessing,
                        err.to_string(),
                        Some(identify(page, element)),
                    );
                }
            }
        }
        let elements_ms = elapsed_ms(phase);

        let phase = Instant::now();
        log_progress(&self.progress, "Deriving theme summaries...");
        self.derive_summaries(page, &mut defaults, &mut snapshot);
        let theme_ms = elapsed_ms(phase);

        snapshot.prune();
        snapshot.media_queries = dedupe_media_queries(std::mem::take(&mut snapshot.media_queries));
        stats.important_rules = snapshot.important_rules.len();
        snapshot.metadata.stats = stats;
        snapshot.metadata.performance = Some(PhaseTimings {
            stylesheets: stylesheets_ms,
            elements: elements_ms,
            theme: theme_ms,
            total: elapsed_ms(started),
        });

        tracing::info!(
            elements = snapshot.computed_styles.len(),
            important_rules = snapshot.important_rules.len(),
            media_queries = snapshot.media_queries.len(),
            errors = snapshot.errors.len(),
            "extraction complete"
        );
        Ok(snapshot)
    }

    async fn process_stylesheets<P: Page + ?Sized>(
        &self,
        page: &P,
        processor: &mut RuleProcessor<'_, P>,
        snapshot: &mut Snapshot,
        stats: &mut ExtractionStats,
    ) {
        let sheets = page.stylesheets();
        log_progress(
            &self.progress,
            &format!("Processing {} stylesheets...", sheets.len()),
        );

        let mut queued = Vec::new();
        for (index, sheet) in sheets.iter().enumerate() {
            stats.stylesheets += 1;
            let label = sheet
                .href
                .clone()
                .unwrap_or_else(|| format!("inline stylesheet #{index}"));
            let reason = match sheet.access() {
                Ok(rules) => {
                    apply_sheet(processor, rules, snapshot, &label);
                    continue;
                }
                Err(reason) => reason,
            };
            match (&self.fetcher, sheet.href.as_deref()) {
                (Some(_), Some(href)) => match resolve_href(page.url(), href) {
                    Ok(url) => queued.push((label, url)),
                    Err(err) => {
                        stats.stylesheets_failed += 1;
                        snapshot.record_issue(IssueKind::StylesheetFetch, err.to_string(), Some(label));
                    }
                },
                _ => {
                    stats.stylesheets_failed += 1;
                    snapshot.record_issue(
                        IssueKind::StylesheetAccess,
                        format!("cannot read stylesheet rules: {reason}"),
                        Some(label),
                    );
                }
            }
        }

        let Some(fetcher) = &self.fetcher else {
            return;
        };
        if queued.is_empty() {
            return;
        }

        log_progress(
            &self.progress,
            &format!("Fetching {} cross-origin stylesheets...", queued.len()),
        );
        let timeout = self.config.fetch.timeout;
        let mut fetches = stream::iter(queued)
            .map(|(label, url)| {
                let fetcher = Arc::clone(fetcher);
                async move {
                    let result = fetch_with_timeout(fetcher.as_ref(), &url, timeout).await;
                    (label, result)
                }
            })
            .buffer_unordered(self.config.fetch.max_concurrent);

        while let Some((label, result)) = fetches.next().await {
            match result {
                Ok(text) if looks_like_html(&text) => {
                    stats.stylesheets_failed += 1;
                    let err = RuleError::NotCss("received an HTML document".to_string());
                    snapshot.record_issue(IssueKind::StylesheetProcessing, err.to_string(), Some(label));
                }
                Ok(text) => {
                    stats.stylesheets_fetched += 1;
                    let rules = parse_stylesheet(&text);
                    apply_sheet(processor, &rules, snapshot, &label);
                }
                Err(err) => {
                    stats.stylesheets_failed += 1;
                    snapshot.record_issue(IssueKind::StylesheetFetch, err.to_string(), Some(label));
                }
            }
        }
    }

    /// Candidates in view, largest visible area first, capped.
    fn rank_candidates<S: StyleSource + ?Sized>(
        &self,
        page: &S,
        viewport: Viewport,
        stats: &mut ExtractionStats,
    ) -> Vec<ElementId> {
        let bounds = viewport.bounds();
        let mut visible = Vec::new();
        for element in page.elements() {
            if !self.importance.is_candidate(page, element) {
                continue;
            }
            stats.candidates += 1;
            let area = page
                .bounding_rect(element)
                .map(|rect| rect.intersection_area(&bounds))
                .unwrap_or(0.0);
            if area <= 0.0 {
                stats.offscreen_skipped += 1;
                continue;
            }
            visible.push((element, area));
        }
        visible.sort_by(|a, b| b.1.total_cmp(&a.1));
        visible.truncate(self.config.limits.max_elements);
        visible.into_iter().map(|(element, _)| element).collect()
    }

    fn process_element<S: StyleSource + ?Sized>(
        &self,
        page: &S,
        element: ElementId,
        defaults: &mut DefaultStyleCache,
        root_font_size: f64,
        snapshot: &mut Snapshot,
        stats: &mut ExtractionStats,
    ) -> std::result::Result<(), PageError> {
        if !self.importance.is_important(page, element) {
            return Ok(());
        }
        let tag = page
            .tag_name(element)
            .ok_or(PageError::UnknownElement(element))?;
        let resolved = page.computed_style(element, None)?;
        let tag_defaults = defaults.get_or_probe(page, tag)?;
        let parent_style = page
            .parent(element)
            .map(|parent| page.computed_style(parent, None))
            .transpose()?;
        let context = FilterContext {
            defaults: Some(tag_defaults.as_ref()),
            parent: parent_style.as_deref(),
            root_font_size,
        };
        let styles = filter_element(page, element, &resolved, &context);

        let mut pseudo_entries = Vec::new();
        for pseudo in PseudoElement::ALL {
            let pseudo_style = page.computed_style(element, Some(pseudo))?;
            if let Some(entry) = filter_pseudo(&pseudo_style, &resolved) {
                pseudo_entries.push((pseudo, entry));
            }
        }

        let key = identify(page, element);
        for (pseudo, entry) in pseudo_entries {
            merge_styles(snapshot, format!("{key}{}", pseudo.selector()), entry);
            stats.pseudo_elements_kept += 1;
        }
        if !styles.is_empty() {
            merge_styles(snapshot, key, styles);
            stats.elements_kept += 1;
        }
        Ok(())
    }

    fn derive_summaries<S: StyleSource + ?Sized>(
        &self,
        page: &S,
        defaults: &mut DefaultStyleCache,
        snapshot: &mut Snapshot,
    ) {
        match summary::color_scheme(page) {
            Ok(scheme) => snapshot.color_scheme = Some(scheme),
            Err(err) => theme_issue(snapshot, "colorScheme", err),
        }
        match summary::typography(page, defaults) {
            Ok(typography) => snapshot.typography = Some(typography),
            Err(err) => theme_issue(snapshot, "typography", err),
        }
        match summary::layout_info(page) {
            Ok(layout) => snapshot.layout_info = Some(layout),
            Err(err) => theme_issue(snapshot, "layoutInfo", err),
        }
        match summary::custom_properties(page) {
            Ok(properties) => snapshot.custom_properties = properties,
            Err(err) => theme_issue(snapshot, "customProperties", err),
        }
    }
}

fn theme_issue(snapshot: &mut Snapshot, section: &str, err: PageError) {
    snapshot.record_issue(IssueKind::ThemeExtraction, err.to_string(), Some(section.to_string()));
}

fn apply_sheet<P: StyleSource + ?Sized>(
    processor: &mut RuleProcessor<'_, P>,
    rules: &[CssRule],
    snapshot: &mut Snapshot,
    label: &str,
) {
    match processor.process_sheet(rules, snapshot) {
        Ok(summary) => tracing::debug!(
            sheet = label,
            important_rules = summary.important_rules,
            media_rules = summary.media_rules,
            animations = summary.animations,
            "processed stylesheet"
        ),
        Err(err) => snapshot.record_issue(
            IssueKind::StylesheetProcessing,
            err.to_string(),
            Some(label.to_string()),
        ),
    }
}

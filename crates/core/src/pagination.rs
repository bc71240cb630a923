//! Page navigation over the rendered document.
//!
//! Page 0 is the main report; page `k` (1-based) shows attachment `k`. The current page lives in
//! [`ReportState`]; these functions are the only way it moves.

use crate::preview::layout::page_id;
use crate::preview::{escape_markup, RenderedDocument};
use crate::state::ReportState;
use serde::Serialize;
use std::fmt::Write;

/// Main page plus one page per attachment.
pub fn total_pages(state: &ReportState) -> usize {
    state.attachments().len() + 1
}

/// Moves by `delta` pages, clamped to the first and last page. Returns the new page.
pub fn change_page(state: &mut ReportState, delta: isize) -> usize {
    let last = total_pages(state) - 1;
    let target = (state.current_page() as isize).saturating_add(delta);
    let target = target.clamp(0, last as isize) as usize;
    state.set_current_page(target);
    target
}

/// Jumps to `page`. Out-of-range targets are ignored and `false` is returned.
pub fn go_to_page(state: &mut ReportState, page: isize) -> bool {
    if page < 0 || page as usize >= total_pages(state) {
        tracing::debug!(page, "ignoring out-of-range page");
        return false;
    }
    state.set_current_page(page as usize);
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavButton {
    pub label: String,
    pub target: usize,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageButton {
    pub page: usize,
    pub label: String,
    pub active: bool,
}

/// The pagination controls: an indicator, step buttons and one button per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlStrip {
    pub indicator: String,
    pub first: NavButton,
    pub previous: NavButton,
    pub next: NavButton,
    pub pages: Vec<PageButton>,
}

impl ControlStrip {
    pub fn new(current: usize, total: usize) -> Self {
        let last = total.saturating_sub(1);
        let kind = if current == 0 {
            "(Laudo Principal)".to_string()
        } else {
            format!("(Anexo {current})")
        };
        Self {
            indicator: format!("Página {} de {} {}", current + 1, total, kind),
            first: NavButton {
                label: "Início".into(),
                target: 0,
                enabled: current > 0,
            },
            previous: NavButton {
                label: "Anterior".into(),
                target: current.saturating_sub(1),
                enabled: current > 0,
            },
            next: NavButton {
                label: "Próxima".into(),
                target: (current + 1).min(last),
                enabled: current < last,
            },
            pages: (0..total)
                .map(|page| PageButton {
                    page,
                    label: (page + 1).to_string(),
                    active: page == current,
                })
                .collect(),
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from(r#"<nav class="laudo-paginacao">"#);
        for button in [&self.first, &self.previous] {
            nav_button(&mut out, button);
        }
        for button in &self.pages {
            let _ = write!(
                out,
                r#"<button data-page="{}" class="{}">{}</button>"#,
                button.page,
                if button.active { "pagina ativa" } else { "pagina" },
                escape_markup(&button.label)
            );
        }
        nav_button(&mut out, &self.next);
        let _ = write!(
            out,
            r#"<span class="indicador">{}</span></nav>"#,
            escape_markup(&self.indicator)
        );
        out
    }
}

fn nav_button(out: &mut String, button: &NavButton) {
    let _ = write!(
        out,
        r#"<button data-page="{}"{}>{}</button>"#,
        button.target,
        if button.enabled { "" } else { " disabled" },
        escape_markup(&button.label)
    );
}

/// Which page is visible, and the controls to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub current: usize,
    pub total: usize,
    /// One entry per page; exactly one is `true`.
    pub visible: Vec<bool>,
    /// `None` when there is only the main page.
    pub controls: Option<ControlStrip>,
}

impl PageView {
    /// Markup of every page, hiding all but the current one, followed by the controls.
    pub fn to_html(&self, document: &RenderedDocument) -> String {
        let mut out = String::new();
        for (page, visible) in document.pages.iter().zip(&self.visible) {
            if *visible {
                out.push_str(&page.markup);
            } else {
                let hidden = page.markup.replacen(
                    &format!(r#"id="{}">"#, page_id(page.index)),
                    &format!(r#"id="{}" style="display:none">"#, page_id(page.index)),
                    1,
                );
                out.push_str(&hidden);
            }
        }
        if let Some(controls) = &self.controls {
            out.push_str(&controls.to_html());
        }
        out
    }
}

/// Builds the view for the current page of `document`.
///
/// The current page is clamped into the document first, so a document rendered before an
/// attachment was removed still yields a consistent view.
pub fn render_current_page(state: &mut ReportState, document: &RenderedDocument) -> PageView {
    let total = document.len().max(1);
    if state.current_page() >= total {
        state.set_current_page(total - 1);
    }
    let current = state.current_page();
    PageView {
        current,
        total,
        visible: (0..total).map(|page| page == current).collect(),
        controls: (total > 1).then(|| ControlStrip::new(current, total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Branding;
    use crate::preview::{layout_document, render_document};
    use crate::state::ReportCommand;
    use laudo_types::{Attachment, AttachmentId, DataUri};

    fn state_with(attachments: usize) -> ReportState {
        let mut state = ReportState::new();
        for n in 0..attachments {
            state
                .apply(ReportCommand::AddAttachment(Attachment {
                    id: AttachmentId::new(format!("a{n}")),
                    display_name: format!("a{n}.png"),
                    image: DataUri::parse("data:image/png;base64,AAAA").unwrap(),
                    mime_type: "image/png".into(),
                    size_label: "3 Bytes".into(),
                    ordinal: 0,
                }))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_change_page_clamps() {
        let mut state = state_with(2);
        assert_eq!(total_pages(&state), 3);
        assert_eq!(change_page(&mut state, -1), 0);
        assert_eq!(change_page(&mut state, 1), 1);
        assert_eq!(change_page(&mut state, 10), 2);
        assert_eq!(change_page(&mut state, 1), 2);
        assert_eq!(change_page(&mut state, isize::MIN), 0);
    }

    #[test]
    fn test_go_to_page_ignores_out_of_range() {
        let mut state = state_with(1);
        assert!(go_to_page(&mut state, 1));
        assert!(!go_to_page(&mut state, 2));
        assert!(!go_to_page(&mut state, -1));
        assert_eq!(state.current_page(), 1);
        assert!(go_to_page(&mut state, 1));
        assert_eq!(state.current_page(), 1);
    }

    #[test]
    fn test_controls_at_boundaries() {
        let first = ControlStrip::new(0, 3);
        assert_eq!(first.indicator, "Página 1 de 3 (Laudo Principal)");
        assert!(!first.first.enabled && !first.previous.enabled && first.next.enabled);
        assert!(first.pages[0].active);

        let last = ControlStrip::new(2, 3);
        assert_eq!(last.indicator, "Página 3 de 3 (Anexo 2)");
        assert!(last.previous.enabled && !last.next.enabled);
        assert_eq!(last.next.target, 2);
        assert!(last.to_html().contains(r#"<button data-page="2" disabled>Próxima</button>"#));
    }

    #[test]
    fn test_render_current_page_shows_one_page() {
        let mut state = state_with(2);
        go_to_page(&mut state, 2);
        let document = render_document(&layout_document(&state, &Branding::default()));
        let view = render_current_page(&mut state, &document);
        assert_eq!(view.visible, vec![false, false, true]);
        assert_eq!(view.total, 3);

        let html = view.to_html(&document);
        assert!(html.contains(r#"id="laudo-pagina-0" style="display:none">"#));
        assert!(html.contains(r#"id="laudo-pagina-2">"#));
        assert!(html.contains("laudo-paginacao"));
    }

    #[test]
    fn test_single_page_has_no_controls() {
        let mut state = state_with(0);
        let document = render_document(&layout_document(&state, &Branding::default()));
        let view = render_current_page(&mut state, &document);
        assert_eq!(view.visible, vec![true]);
        assert!(view.controls.is_none());
    }

    #[test]
    fn test_removing_current_attachment_clamps_page() {
        let mut state = state_with(2);
        go_to_page(&mut state, 2);
        state.apply(ReportCommand::RemoveAttachment(1)).unwrap();
        assert_eq!(state.current_page(), 1);
        let document = render_document(&layout_document(&state, &Branding::default()));
        assert_eq!(render_current_page(&mut state, &document).current, 1);
    }

    #[test]
    fn test_render_current_page_is_idempotent() {
        let mut state = state_with(2);
        go_to_page(&mut state, 1);
        let document = render_document(&layout_document(&state, &Branding::default()));

        let first = render_current_page(&mut state, &document);
        let second = render_current_page(&mut state, &document);
        assert_eq!(first, second);
        assert_eq!(first.to_html(&document), second.to_html(&document));
        assert_eq!(state.current_page(), 1);

        // A stale page index is clamped on the first render and left alone afterwards.
        let shorter = render_document(&layout_document(&state_with(0), &Branding::default()));
        let clamped = render_current_page(&mut state, &shorter);
        assert_eq!(clamped.current, 0);
        assert_eq!(state.current_page(), 0);
        assert_eq!(render_current_page(&mut state, &shorter), clamped);
        assert_eq!(state.current_page(), 0);
    }
}

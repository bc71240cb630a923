//! HTML preview backend.

use super::layout::{Block, DocumentLayout, LabeledValue, PageLayout};
use super::{embeddable_image, escape_markup};
use std::fmt::Write;

/// Markup for one page, wrapped in its `laudo-pagina` container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub index: usize,
    pub id: String,
    pub markup: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub pages: Vec<RenderedPage>,
}

impl RenderedDocument {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, index: usize) -> Option<&RenderedPage> {
        self.pages.get(index)
    }
}

pub fn render_document(layout: &DocumentLayout) -> RenderedDocument {
    RenderedDocument {
        pages: layout.pages.iter().map(render_page).collect(),
    }
}

pub fn render_page(page: &PageLayout) -> RenderedPage {
    let id = page.id();
    let mut out = String::new();
    let _ = write!(out, r#"<div class="laudo-pagina" id="{}">"#, id);
    for block in &page.blocks {
        render_block(&mut out, block);
    }
    out.push_str("</div>");
    RenderedPage {
        index: page.index,
        id,
        markup: out,
    }
}

fn render_block(out: &mut String, block: &Block) {
    // `write!` into a String cannot fail.
    let _ = match block {
        Block::Header { title, subtitle } => write!(
            out,
            r#"<header class="laudo-cabecalho"><h1>{}</h1><p>{}</p></header>"#,
            escape_markup(title),
            escape_markup(subtitle)
        ),
        Block::Divider => write!(out, "<hr>"),
        Block::SectionTitle(title) => write!(
            out,
            r#"<h2 class="laudo-secao">{}</h2>"#,
            escape_markup(title)
        ),
        Block::FieldGrid(items) => {
            out.push_str(r#"<div class="laudo-grade">"#);
            labeled_items(out, items, "laudo-campo");
            write!(out, "</div>")
        }
        Block::ExamInfo { title, description } => write!(
            out,
            r#"<div class="laudo-exame"><h3>{}</h3><p>{}</p></div>"#,
            escape_markup(title),
            escape_markup(description)
        ),
        Block::Results(items) => {
            out.push_str(r#"<div class="laudo-resultados"><h4>Resultados</h4>"#);
            labeled_items(out, items, "laudo-resultado");
            write!(out, "</div>")
        }
        Block::Observations(items) => {
            out.push_str(r#"<div class="laudo-observacoes">"#);
            for item in items {
                let _ = write!(
                    out,
                    r#"<div class="laudo-observacao"><h4>{}</h4><p>{}</p></div>"#,
                    escape_markup(&item.label),
                    multiline(&item.value)
                );
            }
            write!(out, "</div>")
        }
        Block::AttachmentIndicator(count) => write!(
            out,
            r#"<p class="laudo-indicador-anexos">{} anexo(s) - Ver próximas páginas para visualizar</p>"#,
            count
        ),
        Block::Conclusion {
            statement,
            exam_conclusion,
        } => {
            let _ = write!(
                out,
                r#"<div class="laudo-conclusao"><p>{}</p>"#,
                escape_markup(statement)
            );
            if let Some(text) = exam_conclusion {
                let _ = write!(
                    out,
                    "<p><strong>Conclusão do Exame:</strong> {}</p>",
                    multiline(text)
                );
            }
            write!(out, "</div>")
        }
        Block::Signature(image) => match image.as_ref().and_then(embeddable_image) {
            Some(src) => write!(
                out,
                r#"<div class="laudo-assinatura"><img src="{}" alt="Assinatura"></div>"#,
                escape_markup(src)
            ),
            None => write!(
                out,
                r#"<div class="laudo-assinatura laudo-assinatura-vazia">Assinatura não disponível</div>"#
            ),
        },
        Block::ProfessionalInfo {
            name,
            registration,
            date_time,
        } => write!(
            out,
            r#"<div class="laudo-profissional"><p class="nome">{}</p><p>{}</p><p>{}</p></div>"#,
            escape_markup(name),
            escape_markup(registration),
            escape_markup(date_time)
        ),
        Block::FooterNotes(notes) => {
            out.push_str(r#"<footer class="laudo-rodape">"#);
            for note in notes {
                let _ = write!(out, "<p>{}</p>", escape_markup(note));
            }
            write!(out, "</footer>")
        }
        Block::AttachmentTitle(title) => write!(
            out,
            r#"<h2 class="laudo-anexo-titulo">{}</h2>"#,
            escape_markup(title)
        ),
        Block::AttachmentImage { image, alt } => match embeddable_image(image) {
            Some(src) => write!(
                out,
                r#"<div class="laudo-anexo-imagem"><img src="{}" alt="{}"></div>"#,
                escape_markup(src),
                escape_markup(alt)
            ),
            None => write!(
                out,
                r#"<div class="laudo-anexo-imagem laudo-anexo-invalido">{}</div>"#,
                escape_markup(alt)
            ),
        },
        Block::AttachmentCaption(caption) => write!(
            out,
            r#"<p class="laudo-anexo-legenda">{}</p>"#,
            escape_markup(caption)
        ),
    };
}

fn labeled_items(out: &mut String, items: &[LabeledValue], class: &str) {
    for item in items {
        let _ = write!(
            out,
            r#"<div class="{}"><strong>{}:</strong> {}</div>"#,
            class,
            escape_markup(&item.label),
            escape_markup(&item.value)
        );
    }
}

fn multiline(text: &str) -> String {
    escape_markup(text).replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Branding;
    use crate::preview::layout::layout_document;
    use crate::state::{ReportCommand, ReportState};
    use laudo_types::{Attachment, AttachmentId, DataUri, Patient};

    #[test]
    fn test_user_text_is_escaped() {
        let mut state = ReportState::new();
        state
            .apply(ReportCommand::SetPatient(Patient {
                name: "<script>alert(1)</script>".into(),
                ..Default::default()
            }))
            .unwrap();
        let doc = render_document(&layout_document(&state, &Branding::default()));
        let markup = &doc.pages[0].markup;
        assert!(!markup.contains("<script>"));
        assert!(markup.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(markup.starts_with(r#"<div class="laudo-pagina" id="laudo-pagina-0">"#));
        assert!(markup.contains("HOSPITAL SÃO RAFAEL"));
    }

    #[test]
    fn test_attachment_pages_render_images() {
        let mut state = ReportState::new();
        for (name, uri) in [
            ("ok.png", "data:image/png;base64,AAAA"),
            ("bad.html", "data:text/html,<b>x</b>"),
        ] {
            state
                .apply(ReportCommand::AddAttachment(Attachment {
                    id: AttachmentId::new(name),
                    display_name: name.into(),
                    image: DataUri::parse(uri).unwrap(),
                    mime_type: "image/png".into(),
                    size_label: "3 Bytes".into(),
                    ordinal: 0,
                }))
                .unwrap();
        }
        let doc = render_document(&layout_document(&state, &Branding::default()));
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.page(1).unwrap().id, "laudo-pagina-1");
        assert!(doc.pages[1]
            .markup
            .contains(r#"<img src="data:image/png;base64,AAAA" alt="ok.png">"#));
        assert!(!doc.pages[2].markup.contains("<img"));
        assert!(doc.pages[0].markup.contains("2 anexo(s)"));
    }

    #[test]
    fn test_multiline_observations() {
        assert_eq!(multiline("a\nb < c"), "a<br>b &lt; c");
    }
}

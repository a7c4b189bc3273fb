//! Plain-text extraction from markdown for mention scanning.

use comrak::{
    Arena,
    nodes::{AstNode, NodeValue},
    options::Options,
    parse_document,
};

fn parse_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options
}

/// Split a markdown document into runs of plain text.
///
/// Adjacent text nodes are joined into one fragment; every other node ends
/// the current fragment. Code spans, code blocks, raw HTML and link titles
/// contribute nothing.
pub fn text_fragments(markdown: &str) -> Vec<String> {
    let arena = Arena::new();
    let options = parse_options();
    let root = parse_document(&arena, markdown, &options);

    let mut collector = FragmentCollector::default();
    collector.visit(root);
    collector.finish()
}

#[derive(Default)]
struct FragmentCollector {
    buffer: String,
    fragments: Vec<String>,
}

impl FragmentCollector {
    fn visit<'a>(&mut self, node: &'a AstNode<'a>) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                NodeValue::Code(_)
                | NodeValue::CodeBlock(_)
                | NodeValue::HtmlInline(_)
                | NodeValue::HtmlBlock(_) => {
                    self.flush();
                    return;
                }
                _ => self.flush(),
            }
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit(next);
            child = next.next_sibling();
        }

        self.flush();
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.fragments.push(std::mem::take(&mut self.buffer));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.fragments
    }
}

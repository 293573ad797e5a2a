use comrak::options::{ListStyleType, Options};

/// Line opening and closing a leading front-matter block, which is parsed
/// but never rendered.
pub(crate) const FRONT_MATTER_DELIMITER: &str = "---";

/// Parser options shared by every document. Stages add their own extensions
/// on top through [`super::stage::TransformStage::extend_options`].
pub(crate) fn default_options(breaks: bool) -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options.render.hardbreaks = breaks;
    options
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.superscript = true;
    ext.footnotes = true;
    ext.description_lists = true;
    ext.front_matter_delimiter = Some(FRONT_MATTER_DELIMITER.to_string());
    ext.underline = true;
    ext.subscript = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.full_info_string = true;
    render.list_style = ListStyleType::Dash;
    // Authors embed raw HTML (images with sizes, page breaks) on purpose.
    render.r#unsafe = true;
    render.escaped_char_spans = true;
}

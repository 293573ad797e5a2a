use comrak::options::Options;

use super::stage::TransformStage;

/// `- [ ]` / `- [x]` list items rendered as disabled checkboxes.
pub(crate) struct CheckboxStage;

impl TransformStage for CheckboxStage {
    fn name(&self) -> &'static str {
        "checkbox"
    }

    fn extend_options(&self, options: &mut Options<'static>) {
        options.extension.tasklist = true;
        options.render.tasklist_classes = true;
    }
}

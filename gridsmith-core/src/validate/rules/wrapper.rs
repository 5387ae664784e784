use crate::validate::validator::Findings;

pub(crate) fn check(f: &mut Findings) {
    let Some(wrapper) = f.script.wrapper() else {
        f.push_error("Missing Excel.run(async (context) => { ... }) wrapper");
        return;
    };
    if wrapper.context_param.is_none() {
        f.push_warning("Excel.run callback does not take a context parameter");
    }
    if f.script.sync_calls().is_empty() {
        f.push_warning("No context.sync() call; queued commands only flush when the wrapper returns");
    }
}

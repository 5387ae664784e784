use crate::types::estimate_operations;
use crate::validate::validator::Findings;

pub(crate) fn check(f: &mut Findings) {
    let single_cell = f
        .script
        .range_literals()
        .iter()
        .filter(|r| r.address.as_ref().is_some_and(|a| a.is_single_cell()))
        .count()
        + f
            .script
            .tokens
            .windows(2)
            .filter(|w| w[0].is_ident("getCell") && w[1].is_punct("("))
            .count();
    if single_cell > f.policy.max_single_cell_ops {
        f.push_warning(format!(
            "{single_cell} single-cell range operations; batch them into one rectangular write"
        ));
    }

    let syncs = f.script.sync_calls().len();
    let ops = estimate_operations(f.script.source);
    if syncs >= f.policy.min_syncs_for_ratio
        && syncs as f64 / ops.max(1) as f64 > f.policy.max_sync_ratio
    {
        f.push_warning(format!(
            "{syncs} context.sync() calls for ~{ops} operations; sync once per batch"
        ));
    }

    let lines: Vec<usize> = f
        .script
        .syncs_in_loops()
        .into_iter()
        .map(|i| f.script.tokens[i].line)
        .collect();
    for line in lines {
        f.push_warning(format!(
            "Line {line}: context.sync() inside a loop; queue the work and sync after the loop"
        ));
    }
}

use std::collections::BTreeMap;

/// Per-category slot allocation.
///
/// `available` maps each active category to its candidate count, `best` to its
/// best candidate score. Each category gets `max(floor, ceil(budget·count/total))`
/// capped at its count. An oversubscribed budget is trimmed from the largest
/// quota down, never below `min(floor, count)`. If floors alone exceed the
/// budget, categories are served by best score until the budget runs out.
pub fn allocate(
    available: &BTreeMap<String, usize>,
    best: &BTreeMap<String, f64>,
    budget: usize,
    floor: usize,
) -> BTreeMap<String, usize> {
    let total: usize = available.values().sum();
    if total == 0 || budget == 0 {
        return available.keys().map(|c| (c.clone(), 0)).collect();
    }

    let mut quotas: BTreeMap<String, usize> = available
        .iter()
        .map(|(c, &count)| {
            let proportional = (budget * count).div_ceil(total);
            (c.clone(), proportional.max(floor).min(count))
        })
        .collect();

    let mut sum: usize = quotas.values().sum();
    while sum > budget {
        // Largest quota first; ties go to the category name that sorts last.
        let target = quotas
            .iter()
            .filter(|(c, &q)| q > floor.min(available[*c]))
            .max_by(|(ca, qa), (cb, qb)| qa.cmp(qb).then_with(|| ca.cmp(cb)))
            .map(|(c, _)| c.clone());
        let Some(target) = target else { break };
        if let Some(q) = quotas.get_mut(&target) {
            *q -= 1;
        }
        sum -= 1;
    }

    if sum > budget {
        serve_by_rank(&mut quotas, best, budget);
    }
    quotas
}

/// Floors exceed the budget: hand out quotas in order of each category's best score.
fn serve_by_rank(quotas: &mut BTreeMap<String, usize>, best: &BTreeMap<String, f64>, budget: usize) {
    let mut order: Vec<(String, f64)> = quotas
        .keys()
        .map(|c| (c.clone(), best.get(c).copied().unwrap_or(0.0)))
        .collect();
    order.sort_by(|(ca, sa), (cb, sb)| sb.total_cmp(sa).then_with(|| ca.cmp(cb)));

    let mut remaining = budget;
    for (category, _) in order {
        if let Some(q) = quotas.get_mut(&category) {
            let granted = (*q).min(remaining);
            *q = granted;
            remaining -= granted;
        }
    }
}

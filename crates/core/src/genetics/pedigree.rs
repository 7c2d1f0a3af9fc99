use std::collections::{HashMap, VecDeque};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{KinshipError, Result};
use crate::types::{AnimalId, Sex};

/// One input record: an animal with optional sire and dam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedigreeEntry {
    pub animal_id: AnimalId,
    pub sire_id: Option<AnimalId>,
    pub dam_id: Option<AnimalId>,
    pub sex: Sex,
}

impl PedigreeEntry {
    pub fn new(
        animal_id: AnimalId,
        sire_id: Option<AnimalId>,
        dam_id: Option<AnimalId>,
        sex: Sex,
    ) -> Self {
        Self {
            animal_id,
            sire_id,
            dam_id,
            sex,
        }
    }

    /// An animal with both parents unknown.
    pub fn founder(animal_id: AnimalId, sex: Sex) -> Self {
        Self::new(animal_id, None, None, sex)
    }
}

/// Resolved parent links for one animal, addressed by ordered index.
#[derive(Debug, Clone)]
struct Node {
    id: AnimalId,
    /// Index of the sire in `Pedigree::nodes`, or `None` if unknown.
    sire: Option<usize>,
    /// Index of the dam in `Pedigree::nodes`, or `None` if unknown.
    dam: Option<usize>,
}

/// Immutable pedigree for relatedness queries.
///
/// Records are kept in input order for lookup and reporting. Alongside them
/// the pedigree holds a resolved copy ordered so that parents precede their
/// offspring; every index-based accessor refers to that ordering. Parent ids
/// without a record of their own resolve to "unknown".
///
/// Acyclicity is not required. Animals on a parent cycle are ordered after
/// everything they do not depend on, and their descendants still follow
/// them. Only the animals on a cycle are reported by
/// [`Pedigree::cyclic_animals`].
#[derive(Debug, Clone, Default)]
pub struct Pedigree {
    /// Input records, keyed by animal id, in input order.
    entries: IndexMap<AnimalId, PedigreeEntry>,
    /// Resolved links, parents before offspring.
    nodes: Vec<Node>,
    /// Mapping from animal id to its index in `nodes`.
    id_to_index: HashMap<AnimalId, usize>,
    /// Offspring of each node, by index.
    children: Vec<Vec<usize>>,
    /// Animals on a parent cycle, in input order.
    cyclic: Vec<AnimalId>,
}

impl Pedigree {
    /// Create an empty pedigree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pedigree from input records.
    ///
    /// All animals are registered before parents are resolved, so records
    /// may appear in any order.
    ///
    /// # Errors
    /// Returns an error if an animal id is `0` or appears more than once.
    pub fn build<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = PedigreeEntry>,
    {
        let mut entries: IndexMap<AnimalId, PedigreeEntry> = IndexMap::new();
        for rec in records {
            if rec.animal_id == 0 {
                return Err(KinshipError::Pedigree(
                    "Animal id 0 is reserved for unknown parents".to_string(),
                ));
            }
            if entries.contains_key(&rec.animal_id) {
                return Err(KinshipError::Pedigree(format!(
                    "Duplicate animal ID: {}",
                    rec.animal_id
                )));
            }
            entries.insert(rec.animal_id, rec);
        }

        let n = entries.len();
        let mut dangling = 0usize;
        let mut resolve = |parent: Option<AnimalId>| -> Option<usize> {
            let id = parent?;
            let pos = entries.get_index_of(&id);
            if pos.is_none() {
                dangling += 1;
            }
            pos
        };

        // Parent positions in input order.
        let links: Vec<(Option<usize>, Option<usize>)> = entries
            .values()
            .map(|rec| (resolve(rec.sire_id), resolve(rec.dam_id)))
            .collect();

        if dangling > 0 {
            log::debug!(
                "{} parent references have no record and are treated as unknown",
                dangling
            );
        }

        // Kahn's algorithm over parent -> offspring edges.
        let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0u32; n];
        for (i, &(sire, dam)) in links.iter().enumerate() {
            for parent in [sire, dam].into_iter().flatten() {
                children_of[parent].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut placed = vec![false; n];

        while let Some(node) = queue.pop_front() {
            order.push(node);
            placed[node] = true;
            for &child in &children_of[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        // What Kahn leaves behind sits on a cycle or descends from one.
        let mut on_cycle = vec![false; n];
        let leftover: Vec<usize> = (0..n).filter(|&i| !placed[i]).collect();
        for mut component in parent_components(&leftover, &links) {
            let self_parent = |i: usize| links[i].0 == Some(i) || links[i].1 == Some(i);
            if component.len() > 1 || self_parent(component[0]) {
                for &i in &component {
                    on_cycle[i] = true;
                }
            }
            component.sort_unstable();
            order.extend(component);
        }

        let cyclic: Vec<AnimalId> = (0..n)
            .filter(|&i| on_cycle[i])
            .map(|i| entries[i].animal_id)
            .collect();

        if !cyclic.is_empty() {
            log::warn!(
                "Pedigree contains a parent cycle through {} animals (first: {})",
                cyclic.len(),
                cyclic[0]
            );
        }

        let mut old_to_new = vec![0usize; n];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            old_to_new[old_idx] = new_idx;
        }

        let nodes: Vec<Node> = order
            .iter()
            .map(|&old_idx| Node {
                id: entries[old_idx].animal_id,
                sire: links[old_idx].0.map(|s| old_to_new[s]),
                dam: links[old_idx].1.map(|d| old_to_new[d]),
            })
            .collect();

        // Offspring lists follow input order.
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (old_idx, &(sire, dam)) in links.iter().enumerate() {
            let mut parents: Vec<usize> = [sire, dam].into_iter().flatten().collect();
            parents.dedup();
            for parent in parents {
                children[old_to_new[parent]].push(old_to_new[old_idx]);
            }
        }

        let id_to_index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();

        log::debug!("Built pedigree with {} animals", n);

        Ok(Self {
            entries,
            nodes,
            id_to_index,
            children,
            cyclic,
        })
    }

    /// Read a pedigree from a CSV file.
    ///
    /// Expected columns (header required, case-insensitive): `animal`
    /// (or `animal_id`/`id`), `sire` (or `sire_id`), `dam` (or `dam_id`) and
    /// `sex`. Unknown parents are coded as `"0"`, `""`, `"NA"`, `"NaN"`,
    /// `"null"` or `"None"`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, columns are missing,
    /// a field does not parse, or duplicate animal ids are found.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();

        let animal_col = find_column(&headers, &["animal", "animal_id", "id"])?;
        let sire_col = find_column(&headers, &["sire", "sire_id"])?;
        let dam_col = find_column(&headers, &["dam", "dam_id"])?;
        let sex_col = find_column(&headers, &["sex"])?;

        let mut records = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let field = |col: usize, name: &str| {
                record.get(col).ok_or_else(|| {
                    KinshipError::Pedigree(format!("Missing {} field in row {}", name, row + 1))
                })
            };

            let animal_id = parse_animal_id(field(animal_col, "animal")?)?;
            let sire_id = parse_parent(field(sire_col, "sire")?)?;
            let dam_id = parse_parent(field(dam_col, "dam")?)?;
            let sex: Sex = field(sex_col, "sex")?.parse()?;

            records.push(PedigreeEntry::new(animal_id, sire_id, dam_id, sex));
        }

        Self::build(records)
    }

    /// Number of animals in the pedigree.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: AnimalId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The input record for `id`, if any.
    pub fn get(&self, id: AnimalId) -> Option<&PedigreeEntry> {
        self.entries.get(&id)
    }

    /// All records in input order.
    pub fn entries(&self) -> impl Iterator<Item = &PedigreeEntry> {
        self.entries.values()
    }

    /// Ids of every animal of the given sex, in input order.
    pub fn ids_by_sex(&self, sex: Sex) -> Vec<AnimalId> {
        self.entries
            .values()
            .filter(|e| e.sex == sex)
            .map(|e| e.animal_id)
            .collect()
    }

    /// Candidate mates for `target`: every animal of the opposite sex.
    ///
    /// # Errors
    /// Returns [`KinshipError::AnimalNotFound`] if `target` has no record.
    pub fn opposite_sex_pool(&self, target: AnimalId) -> Result<Vec<AnimalId>> {
        let entry = self
            .get(target)
            .ok_or(KinshipError::AnimalNotFound(target))?;
        Ok(self.ids_by_sex(entry.sex.opposite()))
    }

    /// Recorded offspring of `id` (empty for unknown ids).
    pub fn children(&self, id: AnimalId) -> Vec<AnimalId> {
        match self.index_of(id) {
            Some(idx) => self.children[idx]
                .iter()
                .map(|&c| self.nodes[c].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Animals that are their own ancestor, in input order.
    pub fn cyclic_animals(&self) -> &[AnimalId] {
        &self.cyclic
    }

    /// Index of `id` in the parents-first ordering.
    pub(crate) fn index_of(&self, id: AnimalId) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    pub(crate) fn id_at(&self, index: usize) -> AnimalId {
        self.nodes[index].id
    }

    pub(crate) fn sire(&self, index: usize) -> Option<usize> {
        self.nodes[index].sire
    }

    pub(crate) fn dam(&self, index: usize) -> Option<usize> {
        self.nodes[index].dam
    }

    pub(crate) fn children_of(&self, index: usize) -> &[usize] {
        &self.children[index]
    }
}

/// Strongly connected components of the offspring -> parent graph over
/// `nodes` (Tarjan, iterative), parents' components first.
///
/// Edges to parents outside `nodes` are ignored; those parents are already
/// ordered.
fn parent_components(
    nodes: &[usize],
    links: &[(Option<usize>, Option<usize>)],
) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = links.len();
    let mut in_scope = vec![false; n];
    for &i in nodes {
        in_scope[i] = true;
    }

    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut counter = 0usize;

    for &root in nodes {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = counter;
        low[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;

        // (node, next parent slot: 0 = sire, 1 = dam)
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            let (sire, dam) = links[v];
            match [sire, dam].get(frame.1).copied() {
                Some(parent) => {
                    frame.1 += 1;
                    let Some(p) = parent.filter(|&p| in_scope[p]) else {
                        continue;
                    };
                    if index[p] == UNVISITED {
                        index[p] = counter;
                        low[p] = counter;
                        counter += 1;
                        stack.push(p);
                        on_stack[p] = true;
                        frames.push((p, 0));
                    } else if on_stack[p] {
                        low[v] = low[v].min(index[p]);
                    }
                }
                None => {
                    frames.pop();
                    if let Some(&(u, _)) = frames.last() {
                        low[u] = low[u].min(low[v]);
                    }
                    if low[v] == index[v] {
                        let mut component = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        components.push(component);
                    }
                }
            }
        }
    }

    components
}

fn find_column(headers: &[String], names: &[&str]) -> Result<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.as_str()))
        .ok_or_else(|| KinshipError::Pedigree(format!("CSV missing '{}' column", names[0])))
}

fn is_unknown_token(s: &str) -> bool {
    s.is_empty()
        || s == "0"
        || ["na", "nan", "null", "none"]
            .iter()
            .any(|t| s.eq_ignore_ascii_case(t))
}

/// Parse an id, accepting integral float text such as `"12.0"` as written by
/// spreadsheet exports.
fn parse_id(s: &str) -> Option<AnimalId> {
    if let Ok(id) = s.parse::<AnimalId>() {
        return Some(id);
    }
    let value: f64 = s.parse().ok()?;
    if value >= 1.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as AnimalId)
    } else {
        None
    }
}

fn parse_animal_id(s: &str) -> Result<AnimalId> {
    let trimmed = s.trim();
    match parse_id(trimmed) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(KinshipError::Pedigree(format!(
            "Invalid animal id: '{}'",
            trimmed
        ))),
    }
}

/// Parse a parent field, returning `None` for unknown parents.
fn parse_parent(s: &str) -> Result<Option<AnimalId>> {
    let trimmed = s.trim();
    if is_unknown_token(trimmed) || trimmed.parse::<f64>().is_ok_and(|v| v == 0.0) {
        return Ok(None);
    }
    parse_id(trimmed).map(Some).ok_or_else(|| {
        KinshipError::Pedigree(format!("Invalid parent id: '{}'", trimmed))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn write_temp_csv(content: &str) -> std::path::PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "herd_pedigree_{}_{}.csv",
            std::process::id(),
            id
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn entry(id: AnimalId, sire: Option<AnimalId>, dam: Option<AnimalId>) -> PedigreeEntry {
        PedigreeEntry::new(id, sire, dam, Sex::Female)
    }

    #[test]
    fn test_simple_3_animal_pedigree() {
        let ped = Pedigree::build(vec![
            entry(1, None, None),
            entry(2, None, None),
            entry(3, Some(1), Some(2)),
        ])
        .unwrap();
        assert_eq!(ped.len(), 3);

        let idx_3 = ped.index_of(3).unwrap();
        assert_eq!(ped.sire(idx_3), ped.index_of(1));
        assert_eq!(ped.dam(idx_3), ped.index_of(2));
        assert_eq!(ped.sire(ped.index_of(1).unwrap()), None);
        assert!(ped.cyclic_animals().is_empty());
    }

    #[test]
    fn test_offspring_before_parents_is_reordered() {
        let ped = Pedigree::build(vec![
            entry(4, Some(3), None),
            entry(3, Some(2), None),
            entry(2, Some(1), None),
            entry(1, None, None),
        ])
        .unwrap();

        let idx: Vec<usize> = [1, 2, 3, 4].iter().map(|&id| ped.index_of(id).unwrap()).collect();
        assert!(idx[0] < idx[1]);
        assert!(idx[1] < idx[2]);
        assert!(idx[2] < idx[3]);

        // Input order is preserved for reporting.
        let ids: Vec<AnimalId> = ped.entries().map(|e| e.animal_id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_missing_parent_record_is_unknown() {
        let ped = Pedigree::build(vec![entry(5, Some(99), Some(1)), entry(1, None, None)]).unwrap();
        let idx = ped.index_of(5).unwrap();
        assert_eq!(ped.sire(idx), None);
        assert_eq!(ped.dam(idx), ped.index_of(1));
        // The raw record keeps what was supplied.
        assert_eq!(ped.get(5).unwrap().sire_id, Some(99));
        assert!(!ped.contains(99));
    }

    #[test]
    fn test_empty_pedigree() {
        let ped = Pedigree::build(Vec::new()).unwrap();
        assert!(ped.is_empty());
        assert!(ped.children(1).is_empty());
        assert!(matches!(
            ped.opposite_sex_pool(1),
            Err(KinshipError::AnimalNotFound(1))
        ));
    }

    #[test]
    fn test_duplicate_animal_id() {
        let result = Pedigree::build(vec![entry(1, None, None), entry(1, None, None)]);
        let msg = format!("{}", result.unwrap_err());
        assert!(msg.contains("Duplicate"), "Error was: {}", msg);
    }

    #[test]
    fn test_zero_animal_id_rejected() {
        assert!(Pedigree::build(vec![entry(0, None, None)]).is_err());
    }

    #[test]
    fn test_self_parent_is_flagged_cyclic() {
        let ped = Pedigree::build(vec![entry(1, Some(1), None), entry(2, Some(1), None)]).unwrap();
        // 2 only descends from the loop.
        assert_eq!(ped.cyclic_animals(), &[1]);
        assert!(ped.index_of(1) < ped.index_of(2));
        assert_eq!(ped.len(), 2);
    }

    #[test]
    fn test_two_animal_cycle_is_flagged() {
        let ped = Pedigree::build(vec![
            entry(1, None, None),
            entry(2, Some(3), Some(1)),
            entry(3, Some(2), None),
        ])
        .unwrap();
        assert_eq!(ped.cyclic_animals(), &[2, 3]);
        // The founder still orders ahead of the cycle.
        assert_eq!(ped.index_of(1), Some(0));
    }

    #[test]
    fn test_descendants_of_cycle_follow_their_parents() {
        // 1 and 2 sire each other; 3 and 4 only descend from that loop.
        let ped = Pedigree::build(vec![
            entry(4, Some(3), Some(5)),
            entry(3, Some(1), None),
            entry(1, Some(2), None),
            entry(2, Some(1), None),
            entry(5, None, None),
        ])
        .unwrap();
        assert_eq!(ped.cyclic_animals(), &[1, 2]);

        let idx = |id| ped.index_of(id).unwrap();
        assert!(idx(5) < idx(4));
        assert!(idx(1) < idx(3) && idx(2) < idx(3));
        assert!(idx(3) < idx(4));
    }

    #[test]
    fn test_animal_between_two_cycles_is_not_flagged() {
        // 3 descends from the 1-2 loop and is an ancestor of the 4-5 loop.
        let ped = Pedigree::build(vec![
            entry(1, Some(2), None),
            entry(2, Some(1), None),
            entry(3, Some(1), None),
            entry(4, Some(5), Some(3)),
            entry(5, Some(4), None),
        ])
        .unwrap();
        assert_eq!(ped.cyclic_animals(), &[1, 2, 4, 5]);
        let idx = |id| ped.index_of(id).unwrap();
        assert!(idx(1) < idx(3) && idx(3) < idx(4) && idx(3) < idx(5));
    }

    #[test]
    fn test_children_index() {
        let ped = Pedigree::build(vec![
            entry(1, None, None),
            entry(2, None, None),
            entry(3, Some(1), Some(2)),
            entry(4, Some(1), None),
        ])
        .unwrap();
        assert_eq!(ped.children(1), vec![3, 4]);
        assert_eq!(ped.children(2), vec![3]);
        assert!(ped.children(3).is_empty());
        assert!(ped.children(42).is_empty());
    }

    #[test]
    fn test_opposite_sex_pool() {
        let ped = Pedigree::build(vec![
            PedigreeEntry::founder(1, Sex::Male),
            PedigreeEntry::founder(2, Sex::Female),
            PedigreeEntry::founder(3, Sex::Male),
            PedigreeEntry::founder(4, Sex::Female),
        ])
        .unwrap();
        assert_eq!(ped.opposite_sex_pool(2).unwrap(), vec![1, 3]);
        assert_eq!(ped.opposite_sex_pool(1).unwrap(), vec![2, 4]);
        assert_eq!(ped.ids_by_sex(Sex::Male), vec![1, 3]);
    }

    #[test]
    fn test_from_csv_basic() {
        let path = write_temp_csv("animal,sire,dam,sex\n1,0,0,M\n2,0,0,F\n3,1,2,F\n");
        let ped = Pedigree::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(ped.len(), 3);
        let idx = ped.index_of(3).unwrap();
        assert_eq!(ped.sire(idx), ped.index_of(1));
        assert_eq!(ped.dam(idx), ped.index_of(2));
        assert_eq!(ped.get(1).unwrap().sex, Sex::Male);
    }

    #[test]
    fn test_from_csv_alternate_headers_and_unknown_tokens() {
        let path = write_temp_csv(
            "Animal_ID,Sire_ID,Dam_ID,Sex\n10,,NaN,male\n11,NA,null,female\n12,10.0,11,F\n",
        );
        let ped = Pedigree::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(ped.get(10).unwrap().sire_id, None);
        assert_eq!(ped.get(10).unwrap().dam_id, None);
        assert_eq!(ped.get(12).unwrap().sire_id, Some(10));
        assert_eq!(ped.get(12).unwrap().dam_id, Some(11));
    }

    #[test]
    fn test_from_csv_missing_column() {
        let path = write_temp_csv("animal,sire,dam\n1,0,0\n");
        let result = Pedigree::from_csv(&path);
        std::fs::remove_file(&path).ok();

        let msg = format!("{}", result.unwrap_err());
        assert!(msg.contains("sex"), "Error was: {}", msg);
    }

    #[test]
    fn test_parse_parent_variants() {
        assert_eq!(parse_parent("0").unwrap(), None);
        assert_eq!(parse_parent("0.0").unwrap(), None);
        assert_eq!(parse_parent("-0.0").unwrap(), None);
        assert_eq!(parse_parent("").unwrap(), None);
        assert_eq!(parse_parent("  ").unwrap(), None);
        assert_eq!(parse_parent("NA").unwrap(), None);
        assert_eq!(parse_parent("nan").unwrap(), None);
        assert_eq!(parse_parent("None").unwrap(), None);
        assert_eq!(parse_parent("17").unwrap(), Some(17));
        assert_eq!(parse_parent("17.0").unwrap(), Some(17));
        assert!(parse_parent("17.5").is_err());
        assert!(parse_parent("SireA").is_err());
    }
}

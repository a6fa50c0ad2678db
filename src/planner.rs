// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installation planning.

The planner turns a structured request plus the current database and
repository snapshot into a linear plan. Candidates live in an arena of
records addressed by numeric ids; edges between them are expressed as
ids, never owning references.

Violations are collected and reported as a set, so a rejected plan
names every unsatisfiable clause rather than the first. Each violation
class is demotable to a warning by its specific force flag. Ordering
honors Pre-Depends strictly: a dependency cycle through only `Depends`
edges is permitted, one through a `Pre-Depends` edge is fatal and
reported with the full cycle path.
*/

use {
    crate::{
        admin_db::{AdminDb, PackageState, Selection, StatusRecord},
        architecture::Architecture,
        archive::PackageArchive,
        binary_control::BinaryControl,
        context::Context,
        dependency::{DependencyAlternatives, DependencyList, PackageRelationships, SingleDependency},
        error::{Result, WpkgError},
        package_version::PackageVersion,
        repository::RepositoryIndex,
        request::{Operand, Request, Verb},
    },
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        fmt::{Display, Formatter},
        path::PathBuf,
    },
};

/// Where a candidate came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CandidateOrigin {
    /// The currently installed version.
    Installed,
    /// An archive found through the repository index.
    Repository(PathBuf),
    /// An archive supplied explicitly with the request.
    Archive(PathBuf),
}

impl CandidateOrigin {
    fn archive_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Installed => None,
            Self::Repository(path) | Self::Archive(path) => Some(path),
        }
    }
}

/// One candidate record in the arena.
#[derive(Clone, Debug)]
struct Candidate {
    name: String,
    version: PackageVersion,
    architecture: Architecture,
    control: BinaryControl<'static>,
    relationships: PackageRelationships,
    origin: CandidateOrigin,
}

/// A single planner violation.
#[derive(Clone, Debug)]
pub enum PlanViolation {
    UnknownPackage {
        name: String,
    },
    UnsatisfiedDependency {
        package: String,
        clause: String,
    },
    Conflict {
        package: String,
        other: String,
        expression: String,
    },
    Breaks {
        package: String,
        other: String,
        expression: String,
    },
    ArchitectureMismatch {
        package: String,
        architecture: String,
        target: String,
    },
    DistributionMismatch {
        package: String,
        distribution: String,
        expected: String,
    },
    HoldViolation {
        package: String,
        installed: PackageVersion,
        candidate: PackageVersion,
    },
    EssentialRemoval {
        package: String,
    },
    Downgrade {
        package: String,
        installed: PackageVersion,
        candidate: PackageVersion,
    },
    MinimumUpgradableVersion {
        package: String,
        minimum: PackageVersion,
        candidate: PackageVersion,
    },
    FileOverwrite {
        package: String,
        other: String,
        path: String,
    },
    PreDependsCycle {
        cycle: Vec<String>,
    },
    NotInstalled {
        package: String,
    },
}

impl Display for PlanViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPackage { name } => write!(f, "no candidate for package {}", name),
            Self::UnsatisfiedDependency { package, clause } => {
                write!(f, "{} depends on {} which cannot be satisfied", package, clause)
            }
            Self::Conflict {
                package,
                other,
                expression,
            } => write!(f, "{} conflicts with {} ({})", package, other, expression),
            Self::Breaks {
                package,
                other,
                expression,
            } => write!(f, "{} breaks {} ({})", package, other, expression),
            Self::ArchitectureMismatch {
                package,
                architecture,
                target,
            } => write!(
                f,
                "{} architecture {} is incompatible with target {}",
                package, architecture, target
            ),
            Self::DistributionMismatch {
                package,
                distribution,
                expected,
            } => write!(
                f,
                "{} is for distribution {} but the target expects {}",
                package, distribution, expected
            ),
            Self::HoldViolation {
                package,
                installed,
                candidate,
            } => write!(
                f,
                "{} is held at {} and cannot move to {}",
                package, installed, candidate
            ),
            Self::EssentialRemoval { package } => {
                write!(f, "{} is essential and cannot be removed", package)
            }
            Self::Downgrade {
                package,
                installed,
                candidate,
            } => write!(
                f,
                "{} would be downgraded from {} to {}",
                package, installed, candidate
            ),
            Self::MinimumUpgradableVersion {
                package,
                minimum,
                candidate,
            } => write!(
                f,
                "{} cannot upgrade to {} (minimum upgradable version is {})",
                package, candidate, minimum
            ),
            Self::FileOverwrite {
                package,
                other,
                path,
            } => write!(
                f,
                "{} would overwrite {} which is owned by {}",
                package, path, other
            ),
            Self::PreDependsCycle { cycle } => {
                write!(f, "pre-dependency cycle: {}", cycle.join(" -> "))
            }
            Self::NotInstalled { package } => {
                write!(f, "{} is not installed", package)
            }
        }
    }
}

impl PlanViolation {
    /// Whether the context's force flags demote this violation.
    fn demoted(&self, ctx: &Context) -> bool {
        let flags = ctx.flags();

        match self {
            Self::UnsatisfiedDependency { .. } => flags.depends,
            Self::Conflict { .. } => flags.conflicts,
            Self::Breaks { .. } => flags.breaks,
            Self::ArchitectureMismatch { .. } => flags.architecture,
            Self::DistributionMismatch { .. } => flags.distribution,
            Self::HoldViolation { .. } => flags.hold,
            Self::EssentialRemoval { .. } => flags.remove_essential,
            Self::Downgrade { .. } => flags.downgrade,
            Self::MinimumUpgradableVersion { .. } => flags.upgrade_any_version,
            Self::FileOverwrite { .. } => flags.overwrite,
            Self::UnknownPackage { .. }
            | Self::PreDependsCycle { .. }
            | Self::NotInstalled { .. } => false,
        }
    }
}

/// The full set of violations of a rejected plan.
#[derive(Clone, Debug, Default)]
pub struct PlanErrors(pub Vec<PlanViolation>);

impl Display for PlanErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}", violation)?;
        }

        Ok(())
    }
}

/// The action a plan unit performs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlanAction {
    /// Unpack and optionally configure an archive.
    Install {
        archive: PathBuf,
        /// Version being replaced, when upgrading.
        replaces: Option<PackageVersion>,
        /// Whether the package entered the plan only as a dependency.
        auto_installed: bool,
        /// Whether to run the configure phase (false for `unpack`).
        configure: bool,
    },
    /// Configure an already unpacked package.
    Configure,
    /// Remove a package, optionally purging configuration.
    Remove { purge: bool },
}

/// One unit of a materialized plan.
#[derive(Clone, Debug)]
pub struct PlanUnit {
    pub package: String,
    pub version: PackageVersion,
    pub action: PlanAction,
}

/// A linear, totally ordered plan.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub units: Vec<PlanUnit>,
}

/// The dependency planner.
pub struct Planner<'a> {
    ctx: &'a Context,
    /// Arena of candidate records; ids are indices.
    candidates: Vec<Candidate>,
    by_name: HashMap<String, Vec<usize>>,
    /// Virtual package name to (provider id, provided version).
    provides: HashMap<String, Vec<(usize, Option<PackageVersion>)>>,
    installed: BTreeMap<String, StatusRecord>,
}

impl<'a> Planner<'a> {
    /// Create a planner over a database snapshot.
    pub fn new(ctx: &'a Context, db: &AdminDb) -> Result<Self> {
        let mut planner = Self {
            ctx,
            candidates: vec![],
            by_name: HashMap::new(),
            provides: HashMap::new(),
            installed: db.load_status()?,
        };

        for record in planner.installed.clone().values() {
            // A config-files record keeps its database entry but cannot
            // satisfy anything.
            if !record.state.has_files() {
                continue;
            }

            let control: BinaryControl<'static> = record.control.clone().into();
            let relationships = control.relationships()?;

            planner.insert_candidate(Candidate {
                name: record.name.clone(),
                version: record.version.clone(),
                architecture: record.architecture.clone(),
                control,
                relationships,
                origin: CandidateOrigin::Installed,
            });
        }

        Ok(planner)
    }

    /// Index every candidate of a repository.
    pub fn load_repository(&mut self, index: &RepositoryIndex) -> Result<()> {
        for entry in index.entries() {
            let control = entry.control.clone();
            let relationships = control.relationships()?;

            self.insert_candidate(Candidate {
                name: control.package()?.to_string(),
                version: control.version()?,
                architecture: control.architecture()?,
                control,
                relationships,
                origin: CandidateOrigin::Repository(entry.archive_path.clone()),
            });
        }

        Ok(())
    }

    /// Index an explicitly supplied archive.
    pub fn load_archive(&mut self, path: &std::path::Path) -> Result<()> {
        let archive = PackageArchive::open(path)?;
        let control = archive.control()?;
        let relationships = control.relationships()?;

        self.insert_candidate(Candidate {
            name: control.package()?.to_string(),
            version: control.version()?,
            architecture: control.architecture()?,
            control,
            relationships,
            origin: CandidateOrigin::Archive(path.to_path_buf()),
        });

        Ok(())
    }

    fn insert_candidate(&mut self, candidate: Candidate) {
        let id = self.candidates.len();

        if let Some(provides) = &candidate.relationships.provides {
            for clause in provides.requirements() {
                for alt in clause.iter() {
                    // A Provides without an explicit version provides at
                    // the provider's own version.
                    let version = alt
                        .constraint
                        .as_ref()
                        .map(|(_, v)| v.clone())
                        .or_else(|| Some(candidate.version.clone()));

                    self.provides
                        .entry(alt.package.clone())
                        .or_default()
                        .push((id, version));
                }
            }
        }

        self.by_name
            .entry(candidate.name.clone())
            .or_default()
            .push(id);
        self.candidates.push(candidate);
    }

    /// Candidate preference: the installed version first, then highest
    /// version, ties broken by archive path order.
    fn preferred(&self, a: usize, b: usize) -> usize {
        let (ca, cb) = (&self.candidates[a], &self.candidates[b]);

        let a_installed = ca.origin == CandidateOrigin::Installed;
        let b_installed = cb.origin == CandidateOrigin::Installed;

        if a_installed != b_installed {
            return if a_installed { a } else { b };
        }

        match ca.version.cmp(&cb.version) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => {
                let pa = ca.origin.archive_path().cloned().unwrap_or_default();
                let pb = cb.origin.archive_path().cloned().unwrap_or_default();

                if pa <= pb {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// Best candidate for a name under an optional version pin.
    fn best_candidate(
        &self,
        name: &str,
        pinned: Option<&PackageVersion>,
        prefer_installed: bool,
    ) -> Option<usize> {
        let ids = self.by_name.get(name)?;

        let mut best: Option<usize> = None;

        for &id in ids {
            let candidate = &self.candidates[id];

            if let Some(pin) = pinned {
                if &candidate.version != pin {
                    continue;
                }
            }

            if !prefer_installed && candidate.origin == CandidateOrigin::Installed {
                // Skip the installed record when the caller wants the
                // newest archive (upgrade).
                continue;
            }

            best = Some(match best {
                None => id,
                Some(current) => self.preferred(current, id),
            });
        }

        best
    }

    /// Best concrete candidate satisfying a dependency alternative.
    fn best_satisfying(&self, alt: &SingleDependency) -> Option<usize> {
        let ids = self.by_name.get(&alt.package)?;

        let mut best: Option<usize> = None;

        for &id in ids {
            let candidate = &self.candidates[id];

            if alt.satisfied_by(&candidate.name, &candidate.version, &candidate.architecture) {
                best = Some(match best {
                    None => id,
                    Some(current) => self.preferred(current, id),
                });
            }
        }

        best
    }

    /// Compute a plan for a request.
    ///
    /// On rejection, every violation is reported through
    /// [WpkgError::PlanRejected].
    pub fn plan(&mut self, request: &Request) -> Result<Plan> {
        let mut violations = vec![];

        // Selected set: name -> candidate id. Starts as the installed
        // world and is mutated by the request.
        let mut selected: BTreeMap<String, usize> = BTreeMap::new();
        let mut removals: BTreeMap<String, bool> = BTreeMap::new(); // name -> purge
        let mut configures: Vec<String> = vec![];
        let mut auto_installed: HashSet<String> = HashSet::new();
        // Explicit install targets, in request order.
        let mut install_targets: Vec<(usize, bool)> = vec![]; // (id, configure)

        for (name, record) in &self.installed {
            if record.state.has_files() {
                if let Some(id) = self
                    .by_name
                    .get(name)
                    .and_then(|ids| {
                        ids.iter()
                            .find(|&&id| self.candidates[id].origin == CandidateOrigin::Installed)
                    })
                {
                    selected.insert(name.clone(), *id);
                }
            }
        }

        for operation in &request.operations {
            match operation.verb {
                Verb::Install | Verb::Unpack | Verb::Upgrade => {
                    let configure = operation.verb != Verb::Unpack;

                    let resolved = match &operation.operand {
                        Operand::Name(name) => {
                            let prefer_installed = operation.verb != Verb::Upgrade;
                            self.best_candidate(name, None, prefer_installed)
                                .or_else(|| self.best_candidate(name, None, true))
                                .ok_or_else(|| name.clone())
                        }
                        Operand::NameVersion(name, version) => self
                            .best_candidate(name, Some(version), true)
                            .ok_or_else(|| format!("{} (= {})", name, version)),
                        Operand::ArchivePath(path) => self
                            .candidates
                            .iter()
                            .position(|c| c.origin.archive_path() == Some(path))
                            .ok_or_else(|| path.display().to_string()),
                        Operand::None => continue,
                    };

                    match resolved {
                        Ok(id) => {
                            let candidate = &self.candidates[id];

                            if operation.verb == Verb::Upgrade {
                                let newest = candidate.origin == CandidateOrigin::Installed
                                    || self
                                        .installed
                                        .get(&candidate.name)
                                        .map_or(false, |r| candidate.version <= r.version);

                                if newest {
                                    log::info!(
                                        "{} is already the newest version",
                                        candidate.name
                                    );
                                    continue;
                                }
                            }

                            selected.insert(candidate.name.clone(), id);
                            removals.remove(&candidate.name);
                            install_targets.push((id, configure));
                        }
                        Err(name) => violations.push(PlanViolation::UnknownPackage { name }),
                    }
                }
                Verb::Remove | Verb::Purge => {
                    let name = match &operation.operand {
                        Operand::Name(name) | Operand::NameVersion(name, _) => name.clone(),
                        _ => continue,
                    };

                    if !self.installed.contains_key(&name) {
                        violations.push(PlanViolation::NotInstalled { package: name });
                        continue;
                    }

                    selected.remove(&name);
                    removals.insert(name, operation.verb == Verb::Purge);
                }
                Verb::Configure => {
                    let name = match &operation.operand {
                        Operand::Name(name) => name.clone(),
                        _ => continue,
                    };

                    match self.installed.get(&name) {
                        Some(record)
                            if matches!(
                                record.state,
                                PackageState::Unpacked | PackageState::HalfConfigured
                            ) =>
                        {
                            configures.push(name);
                        }
                        Some(_) => {
                            log::info!("{} is already configured", name);
                        }
                        None => violations.push(PlanViolation::NotInstalled { package: name }),
                    }
                }
                Verb::AutoRemove => {
                    for name in self.auto_remove_set(&selected, &removals) {
                        selected.remove(&name);
                        removals.insert(name, false);
                    }
                }
            }
        }

        // Pull in dependencies of everything newly selected,
        // breadth-first, marking them auto-installed.
        let mut queue = install_targets.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let mut expanded = HashSet::new();

        while let Some(id) = queue.pop() {
            if !expanded.insert(id) {
                continue;
            }

            let relationships = self.candidates[id].relationships.clone();
            let package = self.candidates[id].name.clone();

            for list in [&relationships.pre_depends, &relationships.depends]
                .into_iter()
                .flatten()
            {
                for clause in list.requirements() {
                    if self.clause_satisfied(clause, &selected) {
                        continue;
                    }

                    // Try each alternative in order; first resolvable
                    // candidate wins. A concrete package is preferred
                    // over a virtual provider.
                    let mut resolved = None;

                    for alt in clause.iter() {
                        if let Some(dep_id) = self.best_satisfying(alt) {
                            resolved = Some(dep_id);
                            break;
                        }

                        if let Some(providers) = self.provides.get(&alt.package) {
                            let provider = providers
                                .iter()
                                .filter(|(_, version)| {
                                    alt.satisfied_by_virtual(&alt.package, version.as_ref())
                                })
                                .map(|(id, _)| *id)
                                .reduce(|a, b| self.preferred(a, b));

                            if let Some(provider_id) = provider {
                                resolved = Some(provider_id);
                                break;
                            }
                        }
                    }

                    match resolved {
                        Some(dep_id) => {
                            let dep = &self.candidates[dep_id];
                            let dep_name = dep.name.clone();

                            if removals.contains_key(&dep_name) {
                                violations.push(PlanViolation::UnsatisfiedDependency {
                                    package: package.clone(),
                                    clause: clause.to_string(),
                                });
                                continue;
                            }

                            if !selected.contains_key(&dep_name) {
                                auto_installed.insert(dep_name.clone());
                            }

                            selected.insert(dep_name, dep_id);
                            queue.push(dep_id);
                        }
                        None => violations.push(PlanViolation::UnsatisfiedDependency {
                            package: package.clone(),
                            clause: clause.to_string(),
                        }),
                    }
                }
            }

            // Advisory relationships are logged, never fatal.
            for (field, list) in [
                ("Recommends", &relationships.recommends),
                ("Suggests", &relationships.suggests),
            ] {
                if let Some(list) = list {
                    for clause in list.requirements() {
                        if !self.clause_satisfied(clause, &selected) {
                            log::info!("{} {} {}", package, field.to_lowercase(), clause);
                        }
                    }
                }
            }
        }

        self.verify_selection(&selected, &removals, &mut violations);

        // Deduplicate (expansion and verification can both report the
        // same clause), then partition into demoted warnings and fatal
        // errors.
        let mut seen = HashSet::new();
        let fatal = violations
            .into_iter()
            .filter(|violation| seen.insert(violation.to_string()))
            .filter(|violation| {
                if violation.demoted(self.ctx) {
                    log::warn!("{} (forced)", violation);
                    false
                } else {
                    true
                }
            })
            .collect::<Vec<_>>();

        if !fatal.is_empty() {
            return Err(WpkgError::PlanRejected(PlanErrors(fatal)));
        }

        self.materialize(selected, removals, configures, install_targets, auto_installed)
    }

    /// Names eligible for auto-removal: auto-installed and no remaining
    /// package depends on them, computed to a fixed point.
    fn auto_remove_set(
        &self,
        selected: &BTreeMap<String, usize>,
        removals: &BTreeMap<String, bool>,
    ) -> Vec<String> {
        let mut remaining = selected.clone();
        for name in removals.keys() {
            remaining.remove(name);
        }

        let mut eligible = vec![];

        loop {
            let mut changed = false;

            let auto_candidates = remaining
                .iter()
                .filter(|(name, _)| {
                    self.installed
                        .get(*name)
                        .map_or(false, |record| record.auto_installed)
                })
                .map(|(name, id)| (name.clone(), *id))
                .collect::<Vec<_>>();

            for (name, id) in auto_candidates {
                let candidate = &self.candidates[id];

                let needed = remaining.iter().any(|(other_name, &other_id)| {
                    if *other_name == name {
                        return false;
                    }

                    let other = &self.candidates[other_id];

                    [&other.relationships.depends, &other.relationships.pre_depends]
                        .into_iter()
                        .flatten()
                        .any(|list| {
                            list.any_satisfied_by(
                                &candidate.name,
                                &candidate.version,
                                &candidate.architecture,
                            )
                        })
                });

                if !needed {
                    remaining.remove(&name);
                    eligible.push(name);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        eligible
    }

    /// Whether a dependency clause is satisfied within the selection.
    fn clause_satisfied(
        &self,
        clause: &DependencyAlternatives,
        selected: &BTreeMap<String, usize>,
    ) -> bool {
        clause.iter().any(|alt| {
            // Concrete candidates.
            if let Some(&id) = selected.get(&alt.package) {
                let candidate = &self.candidates[id];

                if alt.satisfied_by(&candidate.name, &candidate.version, &candidate.architecture) {
                    return true;
                }
            }

            // Virtual candidates provided by a selected package.
            if let Some(providers) = self.provides.get(&alt.package) {
                for (provider_id, provided_version) in providers {
                    let provider = &self.candidates[*provider_id];

                    if selected.get(&provider.name) == Some(provider_id)
                        && alt.satisfied_by_virtual(&alt.package, provided_version.as_ref())
                    {
                        return true;
                    }
                }
            }

            false
        })
    }

    /// Verify every constraint over the final selection.
    fn verify_selection(
        &self,
        selected: &BTreeMap<String, usize>,
        removals: &BTreeMap<String, bool>,
        violations: &mut Vec<PlanViolation>,
    ) {
        for (name, &id) in selected {
            let candidate = &self.candidates[id];

            // Architecture compatibility (installed records were
            // accepted when they were installed).
            if candidate.origin != CandidateOrigin::Installed
                && !candidate
                    .architecture
                    .compatible_with(self.ctx.architecture())
            {
                violations.push(PlanViolation::ArchitectureMismatch {
                    package: name.clone(),
                    architecture: candidate.architecture.to_string(),
                    target: self.ctx.architecture().to_string(),
                });
            }

            // Distribution gating.
            if let (Some(expected), Some(distribution)) =
                (self.ctx.distribution(), candidate.control.distribution())
            {
                if candidate.origin != CandidateOrigin::Installed && distribution != expected {
                    violations.push(PlanViolation::DistributionMismatch {
                        package: name.clone(),
                        distribution: distribution.to_string(),
                        expected: expected.to_string(),
                    });
                }
            }

            if let Some(record) = self.installed.get(name) {
                if candidate.version != record.version {
                    // Hold forbids version changes.
                    if record.selection == Selection::Hold {
                        violations.push(PlanViolation::HoldViolation {
                            package: name.clone(),
                            installed: record.version.clone(),
                            candidate: candidate.version.clone(),
                        });
                    }

                    if candidate.version < record.version {
                        // A newer installed package may carry a
                        // Minimum-Upgradable-Version the older candidate
                        // lacks; going backwards is a plain downgrade
                        // and needs force-downgrade either way.
                        violations.push(PlanViolation::Downgrade {
                            package: name.clone(),
                            installed: record.version.clone(),
                            candidate: candidate.version.clone(),
                        });
                    } else if let Some(Ok(minimum)) =
                        candidate.control.minimum_upgradable_version()
                    {
                        // The candidate names the oldest version it can
                        // upgrade from.
                        if record.version < minimum {
                            violations.push(PlanViolation::MinimumUpgradableVersion {
                                package: name.clone(),
                                minimum,
                                candidate: candidate.version.clone(),
                            });
                        }
                    }
                }
            }

            // Depends and Pre-Depends must be satisfied in the
            // selection.
            for list in [
                &candidate.relationships.pre_depends,
                &candidate.relationships.depends,
            ]
            .into_iter()
            .flatten()
            {
                for clause in list.requirements() {
                    if !self.clause_satisfied(clause, selected) {
                        violations.push(PlanViolation::UnsatisfiedDependency {
                            package: name.clone(),
                            clause: clause.to_string(),
                        });
                    }
                }
            }

            // Conflicts and Breaks must not hold within the selection,
            // unless a Replaces runs in the reverse direction.
            for (breaks, list) in [
                (false, &candidate.relationships.conflicts),
                (true, &candidate.relationships.breaks),
            ] {
                let list = match list {
                    Some(list) => list,
                    None => continue,
                };

                for clause in list.requirements() {
                    for alt in clause.iter() {
                        let other = match selected.get(&alt.package) {
                            Some(&other_id) if other_id != id => &self.candidates[other_id],
                            _ => continue,
                        };

                        if !alt.satisfied_by(&other.name, &other.version, &other.architecture) {
                            continue;
                        }

                        if self.replaces_declared(candidate, other)
                            || self.replaces_declared(other, candidate)
                        {
                            continue;
                        }

                        if breaks {
                            violations.push(PlanViolation::Breaks {
                                package: name.clone(),
                                other: other.name.clone(),
                                expression: alt.to_string(),
                            });
                        } else {
                            violations.push(PlanViolation::Conflict {
                                package: name.clone(),
                                other: other.name.clone(),
                                expression: alt.to_string(),
                            });
                        }
                    }
                }
            }
        }

        // Essential packages cannot be removed.
        for name in removals.keys() {
            if let Some(record) = self.installed.get(name) {
                let control = BinaryControl::from(record.control.clone());

                if control.essential() {
                    violations.push(PlanViolation::EssentialRemoval {
                        package: name.clone(),
                    });
                }
            }

            // Nothing remaining may depend on a removed package.
            if let Some(record) = self.installed.get(name) {
                for (other_name, &other_id) in selected {
                    let other = &self.candidates[other_id];

                    let broken = [&other.relationships.depends, &other.relationships.pre_depends]
                        .into_iter()
                        .flatten()
                        .flat_map(|list| list.requirements())
                        .any(|clause| {
                            // The clause must currently rely on the
                            // removed package and have no surviving
                            // alternative.
                            clause.iter().any(|alt| {
                                alt.satisfied_by(
                                    &record.name,
                                    &record.version,
                                    &record.architecture,
                                )
                            }) && !self.clause_satisfied(clause, selected)
                        });

                    if broken {
                        violations.push(PlanViolation::UnsatisfiedDependency {
                            package: other_name.clone(),
                            clause: format!("{} (being removed)", name),
                        });
                    }
                }
            }
        }
    }

    /// Whether `a` declares `Replaces` matching `b`.
    fn replaces_declared(&self, a: &Candidate, b: &Candidate) -> bool {
        a.relationships.replaces.as_ref().map_or(false, |list| {
            list.any_satisfied_by(&b.name, &b.version, &b.architecture)
        })
    }

    /// Topologically order install units and emit the final plan.
    fn materialize(
        &self,
        selected: BTreeMap<String, usize>,
        removals: BTreeMap<String, bool>,
        configures: Vec<String>,
        install_targets: Vec<(usize, bool)>,
        auto_installed: HashSet<String>,
    ) -> Result<Plan> {
        let mut units = vec![];

        // Removals first: their reverse dependencies were verified
        // against the post-removal selection already.
        for (name, &purge) in &removals {
            let record = match self.installed.get(name) {
                Some(record) => record,
                None => continue,
            };

            units.push(PlanUnit {
                package: name.clone(),
                version: record.version.clone(),
                action: PlanAction::Remove { purge },
            });
        }

        // Install units: everything selected that is not already the
        // installed version.
        let mut install_units: Vec<(usize, bool)> = vec![];
        let mut unit_configure: HashMap<usize, bool> = HashMap::new();

        for (id, configure) in &install_targets {
            unit_configure.insert(*id, *configure);
        }

        for &id in selected.values() {
            let candidate = &self.candidates[id];

            if candidate.origin == CandidateOrigin::Installed {
                continue;
            }

            let configure = unit_configure.get(&id).copied().unwrap_or(true);
            install_units.push((id, configure));
        }

        let order = self.order_install_units(
            &install_units.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            &selected,
        )?;

        for id in order {
            let candidate = &self.candidates[id];
            let configure = install_units
                .iter()
                .find(|(unit_id, _)| *unit_id == id)
                .map(|(_, configure)| *configure)
                .unwrap_or(true);

            let archive = candidate
                .origin
                .archive_path()
                .cloned()
                .expect("install unit has an archive origin");

            let replaces = self
                .installed
                .get(&candidate.name)
                .map(|record| record.version.clone());

            units.push(PlanUnit {
                package: candidate.name.clone(),
                version: candidate.version.clone(),
                action: PlanAction::Install {
                    archive,
                    replaces,
                    auto_installed: auto_installed.contains(&candidate.name),
                    configure,
                },
            });
        }

        for name in configures {
            let record = match self.installed.get(&name) {
                Some(record) => record,
                None => continue,
            };

            units.push(PlanUnit {
                package: name,
                version: record.version.clone(),
                action: PlanAction::Configure,
            });
        }

        Ok(Plan { units })
    }

    /// Order install units so dependencies precede dependents.
    ///
    /// Pre-Depends edges are strict: a strongly connected component
    /// containing one is fatal. Components held together only by
    /// Depends edges are emitted in arena id order.
    fn order_install_units(
        &self,
        unit_ids: &[usize],
        selected: &BTreeMap<String, usize>,
    ) -> Result<Vec<usize>> {
        let unit_set: HashSet<usize> = unit_ids.iter().copied().collect();

        // Edges dependent -> dependency, tagged pre_depends.
        let mut edges: HashMap<usize, Vec<(usize, bool)>> = HashMap::new();

        for &id in unit_ids {
            let candidate = &self.candidates[id];

            for (pre, list) in [
                (true, &candidate.relationships.pre_depends),
                (false, &candidate.relationships.depends),
            ] {
                let list: &Option<DependencyList> = list;

                if let Some(list) = list {
                    for clause in list.requirements() {
                        for alt in clause.iter() {
                            if let Some(&dep_id) = selected.get(&alt.package) {
                                if dep_id != id && unit_set.contains(&dep_id) {
                                    edges.entry(id).or_default().push((dep_id, pre));
                                }
                            }

                            // A dependency satisfied by a virtual
                            // provider orders against the provider.
                            if let Some(providers) = self.provides.get(&alt.package) {
                                for (provider_id, _) in providers {
                                    if *provider_id != id
                                        && unit_set.contains(provider_id)
                                        && selected
                                            .get(&self.candidates[*provider_id].name)
                                            == Some(provider_id)
                                    {
                                        edges.entry(id).or_default().push((*provider_id, pre));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        // Tarjan's strongly connected components over the unit graph.
        let sccs = tarjan_scc(unit_ids, &edges);

        // A component with an internal Pre-Depends edge cannot be
        // ordered; report the full cycle.
        for scc in &sccs {
            if scc.len() < 2 {
                continue;
            }

            let in_scc: HashSet<usize> = scc.iter().copied().collect();

            let has_pre_depends = scc.iter().any(|&id| {
                edges.get(&id).map_or(false, |targets| {
                    targets
                        .iter()
                        .any(|(target, pre)| *pre && in_scc.contains(target))
                })
            });

            if has_pre_depends {
                let mut cycle = scc
                    .iter()
                    .map(|&id| self.candidates[id].name.clone())
                    .collect::<Vec<_>>();
                cycle.push(cycle[0].clone());

                return Err(WpkgError::PlanRejected(PlanErrors(vec![
                    PlanViolation::PreDependsCycle { cycle },
                ])));
            }
        }

        // The SCC list from Tarjan is in reverse topological order of
        // the condensation: dependencies come first, which is exactly
        // plan order. Members inside a Depends-only component are
        // emitted in arena id order for determinism.
        let mut order = vec![];

        for mut scc in sccs {
            scc.sort_unstable();
            order.extend(scc);
        }

        Ok(order)
    }
}

/// Tarjan's strongly connected components.
///
/// Returns components in reverse topological order of the condensation
/// (every edge points from a later component to an earlier one).
fn tarjan_scc(nodes: &[usize], edges: &HashMap<usize, Vec<(usize, bool)>>) -> Vec<Vec<usize>> {
    struct State<'e> {
        edges: &'e HashMap<usize, Vec<(usize, bool)>>,
        index: HashMap<usize, usize>,
        lowlink: HashMap<usize, usize>,
        on_stack: HashSet<usize>,
        stack: Vec<usize>,
        counter: usize,
        output: Vec<Vec<usize>>,
    }

    fn strongconnect(v: usize, state: &mut State) {
        state.index.insert(v, state.counter);
        state.lowlink.insert(v, state.counter);
        state.counter += 1;
        state.stack.push(v);
        state.on_stack.insert(v);

        let targets = state
            .edges
            .get(&v)
            .map(|t| t.iter().map(|(w, _)| *w).collect::<Vec<_>>())
            .unwrap_or_default();

        for w in targets {
            if !state.index.contains_key(&w) {
                strongconnect(w, state);
                let low = (*state.lowlink.get(&v).expect("visited"))
                    .min(*state.lowlink.get(&w).expect("visited"));
                state.lowlink.insert(v, low);
            } else if state.on_stack.contains(&w) {
                let low = (*state.lowlink.get(&v).expect("visited"))
                    .min(*state.index.get(&w).expect("visited"));
                state.lowlink.insert(v, low);
            }
        }

        if state.lowlink.get(&v) == state.index.get(&v) {
            let mut component = vec![];

            while let Some(w) = state.stack.pop() {
                state.on_stack.remove(&w);
                component.push(w);

                if w == v {
                    break;
                }
            }

            state.output.push(component);
        }
    }

    let mut state = State {
        edges,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: vec![],
        counter: 0,
        output: vec![],
    };

    for &node in nodes {
        if !state.index.contains_key(&node) {
            strongconnect(node, &mut state);
        }
    }

    state.output
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            archive::{builder::tests::test_control, PackageBuilder},
            control::ControlFile,
        },
        std::path::Path,
        tempfile::TempDir,
    };

    struct Fixture {
        _dir: TempDir,
        ctx: Context,
        db: AdminDb,
        repo: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();

        let db = AdminDb::create(dir.path().join("admin")).unwrap();
        let mut ctx =
            Context::new(&root, db.admin_dir(), "linux-amd64".parse().unwrap()).unwrap();
        ctx.set_subst(crate::subst::SubstTable::default());

        Fixture {
            _dir: dir,
            ctx,
            db,
            repo,
        }
    }

    fn write_package(repo: &Path, name: &str, version: &str, fields: &[(&str, &str)]) {
        let mut control = test_control(name, version);
        for (field, value) in fields {
            control.set_field_from_string(
                field.to_string().into(),
                value.to_string().into(),
            );
        }

        let mut builder = PackageBuilder::new(control).unwrap();
        builder.set_mtime(Some(std::time::UNIX_EPOCH));
        builder.install_file(format!("usr/bin/{}", name), name.as_bytes().to_vec(), 0o755);

        builder
            .write_to_path(repo.join(format!("{}_{}_linux-amd64.deb", name, version)))
            .unwrap();
    }

    fn record_installed(db: &AdminDb, name: &str, version: &str, fields: &[(&str, &str)]) {
        let text = format!(
            "Package: {}\nVersion: {}\nArchitecture: linux-amd64\nMaintainer: m\nDescription: d\n{}",
            name,
            version,
            fields
                .iter()
                .map(|(f, v)| format!("{}: {}\n", f, v))
                .collect::<String>()
        );

        let control: BinaryControl = ControlFile::parse_str(&text)
            .unwrap()
            .into_paragraphs()
            .next()
            .unwrap()
            .into();

        let record =
            StatusRecord::new(&control, PackageState::Installed, Selection::Install).unwrap();
        db.upsert_record(record).unwrap();
    }

    fn planner_with_repo<'a>(fixture: &'a Fixture) -> Planner<'a> {
        let index = RepositoryIndex::build(&fixture.repo).unwrap();
        let mut planner = Planner::new(&fixture.ctx, &fixture.db).unwrap();
        planner.load_repository(&index).unwrap();
        planner
    }

    fn install_request(name: &str) -> Request {
        let mut request = Request::default();
        request.push(Verb::Install, Operand::Name(name.to_string()));
        request
    }

    #[test]
    fn simple_install_plan() -> Result<()> {
        let fixture = fixture();
        write_package(&fixture.repo, "t1", "1.0", &[]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("t1"))?;

        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].package, "t1");
        assert!(matches!(
            plan.units[0].action,
            PlanAction::Install {
                configure: true,
                replaces: None,
                auto_installed: false,
                ..
            }
        ));

        Ok(())
    }

    #[test]
    fn dependencies_pulled_in_and_ordered() -> Result<()> {
        let fixture = fixture();
        write_package(&fixture.repo, "app", "1.0", &[("Depends", "lib (>= 1.0)")]);
        write_package(&fixture.repo, "lib", "1.2", &[("Pre-Depends", "loader")]);
        write_package(&fixture.repo, "loader", "0.9", &[]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("app"))?;

        let order = plan
            .units
            .iter()
            .map(|u| u.package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["loader", "lib", "app"]);

        // Dependencies are marked auto-installed, the target is not.
        for unit in &plan.units {
            if let PlanAction::Install { auto_installed, .. } = &unit.action {
                assert_eq!(*auto_installed, unit.package != "app", "{}", unit.package);
            }
        }

        Ok(())
    }

    #[test]
    fn unsatisfied_dependency_names_clause() {
        // t3 Depends: t2 (>= 1.0) with only t2 0.9 available.
        let fixture = fixture();
        write_package(&fixture.repo, "t3", "1.0", &[("Depends", "t2 (>= 1.0)")]);
        write_package(&fixture.repo, "t2", "0.9", &[]);

        let mut planner = planner_with_repo(&fixture);

        match planner.plan(&install_request("t3")) {
            Err(WpkgError::PlanRejected(errors)) => {
                let rendered = errors.to_string();
                assert!(rendered.contains("t2 (>= 1.0)"), "got: {}", rendered);
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }
    }

    #[test]
    fn all_violations_reported() {
        // pa depends on pb and pc which need incompatible pd versions.
        let fixture = fixture();
        write_package(&fixture.repo, "pa", "1.0", &[("Depends", "pb, pc")]);
        write_package(&fixture.repo, "pb", "1.0", &[("Depends", "pd (= 1.0)")]);
        write_package(&fixture.repo, "pc", "1.0", &[("Depends", "pd (= 2.0)")]);
        write_package(&fixture.repo, "pd", "1.0", &[]);

        let mut planner = planner_with_repo(&fixture);

        match planner.plan(&install_request("pa")) {
            Err(WpkgError::PlanRejected(errors)) => {
                let rendered = errors.to_string();
                assert!(rendered.contains("pd (= 2.0)"), "got: {}", rendered);
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }
    }

    #[test]
    fn hold_blocks_version_change() -> Result<()> {
        // held v1.0 installed with selection hold; friend
        // needs held 1.5.
        let fixture = fixture();
        write_package(&fixture.repo, "friend", "1.0", &[("Depends", "held (= 1.5)")]);
        write_package(&fixture.repo, "held", "1.5", &[]);

        let text = "Package: held\nVersion: 1.0\nArchitecture: linux-amd64\nMaintainer: m\nDescription: d\n";
        let control: BinaryControl = ControlFile::parse_str(text)
            .unwrap()
            .into_paragraphs()
            .next()
            .unwrap()
            .into();
        let mut record =
            StatusRecord::new(&control, PackageState::Installed, Selection::Hold)?;
        record.selection = Selection::Hold;
        fixture.db.upsert_record(record)?;

        let mut planner = planner_with_repo(&fixture);
        assert!(matches!(
            planner.plan(&install_request("friend")),
            Err(WpkgError::PlanRejected(_))
        ));

        // Forcing hold on an explicit install of held succeeds.
        let mut forced = fixture.ctx.clone();
        let mut flags = *forced.flags();
        flags.hold = true;
        forced.set_flags(flags);

        let index = RepositoryIndex::build(&fixture.repo).unwrap();
        let mut planner = Planner::new(&forced, &fixture.db)?;
        planner.load_repository(&index)?;

        let mut request = Request::default();
        request.push(
            Verb::Install,
            Operand::NameVersion("held".into(), PackageVersion::parse("1.5")?),
        );
        let plan = planner.plan(&request)?;
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].package, "held");

        Ok(())
    }

    #[test]
    fn essential_removal_blocked() {
        let fixture = fixture();
        record_installed(&fixture.db, "core", "1.0", &[("Essential", "yes")]);

        let mut planner = Planner::new(&fixture.ctx, &fixture.db).unwrap();

        let mut request = Request::default();
        request.push(Verb::Remove, Operand::Name("core".into()));

        match planner.plan(&request) {
            Err(WpkgError::PlanRejected(errors)) => {
                assert!(errors.to_string().contains("essential"));
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }

        // force-remove-essential demotes it.
        let mut forced = fixture.ctx.clone();
        let mut flags = *forced.flags();
        flags.remove_essential = true;
        forced.set_flags(flags);

        let mut planner = Planner::new(&forced, &fixture.db).unwrap();
        let plan = planner.plan(&request).unwrap();
        assert_eq!(plan.units.len(), 1);
        assert!(matches!(
            plan.units[0].action,
            PlanAction::Remove { purge: false }
        ));
    }

    #[test]
    fn conflicts_and_replaces_exception() -> Result<()> {
        let fixture = fixture();
        record_installed(&fixture.db, "old-impl", "1.0", &[]);
        write_package(
            &fixture.repo,
            "new-impl",
            "2.0",
            &[("Conflicts", "old-impl"), ("Replaces", "old-impl")],
        );
        write_package(&fixture.repo, "rival", "2.0", &[("Conflicts", "old-impl")]);

        let mut planner = planner_with_repo(&fixture);

        // Plain conflict is fatal.
        assert!(matches!(
            planner.plan(&install_request("rival")),
            Err(WpkgError::PlanRejected(_))
        ));

        // Conflicts plus Replaces in the same direction is permitted.
        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("new-impl"))?;
        assert_eq!(plan.units.len(), 1);

        Ok(())
    }

    #[test]
    fn provides_satisfies_dependency() -> Result<()> {
        let fixture = fixture();
        write_package(&fixture.repo, "client", "1.0", &[("Depends", "mail-agent")]);
        write_package(&fixture.repo, "postfix", "3.0", &[("Provides", "mail-agent")]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("client"))?;

        let names = plan
            .units
            .iter()
            .map(|u| u.package.as_str())
            .collect::<Vec<_>>();
        assert!(names.contains(&"postfix"), "got {:?}", names);
        assert!(names.contains(&"client"));

        Ok(())
    }

    #[test]
    fn versioned_dependency_rejects_unversioned_provides() {
        let fixture = fixture();
        write_package(
            &fixture.repo,
            "client",
            "1.0",
            &[("Depends", "mail-agent (>= 9.0)")],
        );
        write_package(&fixture.repo, "postfix", "3.0", &[("Provides", "mail-agent")]);

        let mut planner = planner_with_repo(&fixture);
        // Provides at the provider's version 3.0 does not satisfy >= 9.0.
        assert!(matches!(
            planner.plan(&install_request("client")),
            Err(WpkgError::PlanRejected(_))
        ));
    }

    #[test]
    fn depends_only_cycle_permitted() -> Result<()> {
        let fixture = fixture();
        write_package(&fixture.repo, "ying", "1.0", &[("Depends", "yang")]);
        write_package(&fixture.repo, "yang", "1.0", &[("Depends", "ying")]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("ying"))?;

        assert_eq!(plan.units.len(), 2);

        Ok(())
    }

    #[test]
    fn pre_depends_cycle_fatal_with_path() {
        let fixture = fixture();
        write_package(&fixture.repo, "ying", "1.0", &[("Pre-Depends", "yang")]);
        write_package(&fixture.repo, "yang", "1.0", &[("Depends", "ying")]);

        let mut planner = planner_with_repo(&fixture);

        match planner.plan(&install_request("ying")) {
            Err(WpkgError::PlanRejected(errors)) => {
                let rendered = errors.to_string();
                assert!(rendered.contains("pre-dependency cycle"), "got {}", rendered);
                assert!(rendered.contains("ying"), "got {}", rendered);
                assert!(rendered.contains("yang"), "got {}", rendered);
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }
    }

    #[test]
    fn pre_depends_orders_strictly() -> Result<()> {
        // If A Pre-Depends on B, B comes strictly first.
        let fixture = fixture();
        write_package(&fixture.repo, "a", "1.0", &[("Pre-Depends", "b")]);
        write_package(&fixture.repo, "b", "1.0", &[]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("a"))?;

        let pos = |name: &str| {
            plan.units
                .iter()
                .position(|u| u.package == name)
                .unwrap()
        };
        assert!(pos("b") < pos("a"));

        Ok(())
    }

    #[test]
    fn highest_version_preferred() -> Result<()> {
        let fixture = fixture();
        write_package(&fixture.repo, "t1", "1.0", &[]);
        write_package(&fixture.repo, "t1", "1.2", &[]);
        write_package(&fixture.repo, "t1", "1.1", &[]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("t1"))?;

        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].version, PackageVersion::parse("1.2")?);

        Ok(())
    }

    #[test]
    fn installed_version_satisfies_without_unit() -> Result<()> {
        let fixture = fixture();
        record_installed(&fixture.db, "lib", "1.0", &[]);
        write_package(&fixture.repo, "app", "1.0", &[("Depends", "lib")]);
        write_package(&fixture.repo, "lib", "2.0", &[]);

        let mut planner = planner_with_repo(&fixture);
        let plan = planner.plan(&install_request("app"))?;

        // Installed lib 1.0 satisfies; no upgrade unit is created.
        let names = plan
            .units
            .iter()
            .map(|u| u.package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["app"]);

        Ok(())
    }

    #[test]
    fn downgrade_requires_force() {
        let fixture = fixture();
        record_installed(&fixture.db, "t1", "2.0", &[]);
        write_package(&fixture.repo, "t1", "1.0", &[]);

        let mut planner = planner_with_repo(&fixture);

        let mut request = Request::default();
        request.push(
            Verb::Install,
            Operand::NameVersion("t1".into(), PackageVersion::parse("1.0").unwrap()),
        );

        assert!(matches!(
            planner.plan(&request),
            Err(WpkgError::PlanRejected(_))
        ));

        let mut forced = fixture.ctx.clone();
        let mut flags = *forced.flags();
        flags.downgrade = true;
        forced.set_flags(flags);

        let index = RepositoryIndex::build(&fixture.repo).unwrap();
        let mut planner = Planner::new(&forced, &fixture.db).unwrap();
        planner.load_repository(&index).unwrap();

        let plan = planner.plan(&request).unwrap();
        assert_eq!(plan.units.len(), 1);
    }

    #[test]
    fn auto_remove_fixed_point() -> Result<()> {
        let fixture = fixture();

        record_installed(&fixture.db, "app", "1.0", &[("Depends", "libmid")]);
        record_installed(&fixture.db, "libmid", "1.0", &[("Depends", "libleaf")]);
        record_installed(&fixture.db, "libleaf", "1.0", &[]);

        // Mark the libraries auto-installed.
        let mut records = fixture.db.load_status()?;
        for name in ["libmid", "libleaf"] {
            records.get_mut(name).unwrap().auto_installed = true;
        }
        fixture.db.write_status(&records)?;

        // Removing app frees libmid, which frees libleaf.
        let mut planner = Planner::new(&fixture.ctx, &fixture.db)?;
        let mut request = Request::default();
        request.push(Verb::Remove, Operand::Name("app".into()));
        request.push(Verb::AutoRemove, Operand::None);

        let plan = planner.plan(&request)?;

        let mut removed = plan
            .units
            .iter()
            .filter(|u| matches!(u.action, PlanAction::Remove { .. }))
            .map(|u| u.package.as_str())
            .collect::<Vec<_>>();
        removed.sort_unstable();
        assert_eq!(removed, vec!["app", "libleaf", "libmid"]);

        Ok(())
    }

    #[test]
    fn removal_breaking_dependency_rejected() {
        let fixture = fixture();
        record_installed(&fixture.db, "lib", "1.0", &[]);
        record_installed(&fixture.db, "app", "1.0", &[("Depends", "lib")]);

        let mut planner = Planner::new(&fixture.ctx, &fixture.db).unwrap();
        let mut request = Request::default();
        request.push(Verb::Remove, Operand::Name("lib".into()));

        match planner.plan(&request) {
            Err(WpkgError::PlanRejected(errors)) => {
                assert!(errors.to_string().contains("app"));
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }
    }

    #[test]
    fn architecture_mismatch_rejected() {
        let fixture = fixture();

        let mut control = test_control("alien", "1.0");
        control.set_field_from_string("Architecture".into(), "mswindows-i386".into());
        let mut builder = PackageBuilder::new(control).unwrap();
        builder.set_mtime(Some(std::time::UNIX_EPOCH));
        builder
            .write_to_path(fixture.repo.join("alien_1.0_mswindows-i386.deb"))
            .unwrap();

        let mut planner = planner_with_repo(&fixture);

        match planner.plan(&install_request("alien")) {
            Err(WpkgError::PlanRejected(errors)) => {
                assert!(errors.to_string().contains("incompatible"));
            }
            other => panic!("expected rejection, got {:?}", other.map(|p| p.units.len())),
        }
    }
}

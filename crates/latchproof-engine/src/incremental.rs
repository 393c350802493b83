//! Saved clause databases: persisting, reloading, revalidating and warm
//! restarts.

use std::path::Path;

use latchproof_sat::SolverFactory;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cube::Cube;
use crate::error::PdrError;
use crate::manager::PdrManager;
use crate::result::{PdrReport, RevalidationFailure};

/// Clauses of every frame, keyed to the normalized system they were learned
/// on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseDatabase {
    /// SHA-256 of the normalized system.
    pub fingerprint: String,
    pub num_registers: usize,
    /// Blocked cubes per frame, as literal codes.
    pub frames: Vec<Vec<Vec<u32>>>,
}

impl ClauseDatabase {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_clauses(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    pub fn to_json(&self) -> Result<String, PdrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PdrError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), PdrError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, PdrError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// State of a manager after reloading a clause database.
#[derive(Debug)]
pub(crate) struct Restored {
    /// Clauses dropped because they no longer hold.
    pub failures: Vec<RevalidationFailure>,
    /// Frame to resume the search at.
    pub start: usize,
}

/// Report of an incremental run together with the clauses it ended with.
#[derive(Debug, Clone)]
pub struct IncrementalOutcome {
    pub report: PdrReport,
    pub database: Option<ClauseDatabase>,
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Snapshot of the clause database. With `drop_last` the clauses of the
    /// last frame move down one frame and the last frame disappears.
    ///
    /// `None` when there is nothing worth saving.
    pub fn save_clauses(&self, drop_last: bool) -> Option<ClauseDatabase> {
        let n = self.frames.len();
        if n <= 1 || (drop_last && n <= 2) {
            return None;
        }
        let mut frames = self.frame_snapshot();
        if drop_last {
            if let Some(last) = frames.pop() {
                if let Some(prev) = frames.last_mut() {
                    prev.extend(last);
                    prev.sort();
                    prev.dedup();
                }
            }
        }
        Some(ClauseDatabase {
            fingerprint: self.design.fingerprint().to_string(),
            num_registers: self.design.num_registers(),
            frames,
        })
    }

    /// Loads `db` into a manager without frames, dropping every clause that
    /// no longer holds where it was saved.
    pub fn restore(&mut self, db: &ClauseDatabase) -> Result<Restored, PdrError> {
        if !self.frames.is_empty() {
            return Err(PdrError::InternalInvariantViolation(
                "clause database restored into a running manager".into(),
            ));
        }
        let design = self.design;
        if db.fingerprint != design.fingerprint() || db.num_registers != design.num_registers() {
            return Err(PdrError::MalformedInput(format!(
                "clause database was saved for a different system ({} registers, fingerprint {})",
                db.num_registers, db.fingerprint
            )));
        }
        if db.frames.is_empty() {
            return Err(PdrError::MalformedInput(
                "clause database has no frames".into(),
            ));
        }

        let mut failures = Vec::new();
        let mut loaded: Vec<Vec<(usize, Cube)>> = Vec::with_capacity(db.frames.len());
        for (k, frame) in db.frames.iter().enumerate() {
            let mut cubes = Vec::with_capacity(frame.len());
            for (index, codes) in frame.iter().enumerate() {
                let cube = Cube::from_codes(codes)?;
                if let Some(lit) = cube.lits().iter().find(|l| l.register() >= db.num_registers) {
                    return Err(PdrError::MalformedInput(format!(
                        "clause {index} of frame {k} mentions register {}",
                        lit.register()
                    )));
                }
                if k == 0 {
                    failures.push(RevalidationFailure {
                        frame: 0,
                        index,
                        literals: codes.clone(),
                    });
                } else {
                    cubes.push((index, cube));
                }
            }
            loaded.push(cubes);
        }

        for _ in 0..db.frames.len() {
            self.push_frame()?;
        }
        for (k, cubes) in loaded.iter().enumerate() {
            self.frames[k].clauses = cubes.iter().map(|(_, c)| c.clone()).collect();
        }
        for k in 1..self.frames.len() {
            self.rebuild(k)?;
        }

        // Dropping a clause weakens the frames below it, so repeat until
        // every survivor holds.
        loop {
            let mut broken = Vec::new();
            for k in 1..self.frames.len() {
                for j in 0..self.frames[k].clauses.len() {
                    let cube = self.frames[k].clauses[j].clone();
                    if cube.is_init_intersecting(None)
                        || !self.check_cube(k - 1, Some(&cube), false)?.is_blocked()
                    {
                        broken.push((k, j));
                    }
                }
            }
            if broken.is_empty() {
                break;
            }
            for &(k, j) in broken.iter().rev() {
                let cube = self.frames[k].clauses.remove(j);
                let (index, _) = loaded[k].remove(j);
                warn!(frame = k, index, clause = %cube, "pdr: reloaded clause does not hold");
                failures.push(RevalidationFailure {
                    frame: k,
                    index,
                    literals: cube.codes(),
                });
            }
            for k in 1..self.frames.len() {
                self.rebuild(k)?;
            }
        }
        failures.sort_by_key(|f| (f.frame, f.index));

        let restored: Vec<Cube> = self.frames.iter().flat_map(|f| f.clauses.clone()).collect();
        for cube in &restored {
            self.bump_priorities(cube);
        }
        if self.frames.len() < 2 {
            self.push_frame()?;
        }
        info!(
            frames = self.frames.len(),
            clauses = restored.len(),
            dropped = failures.len(),
            "pdr: restored clause database"
        );

        let last = self.last_frame();
        for k in 1..=last {
            for o in 0..self.status.len() {
                if !self.status[o].is_open() || self.design.output_edge(o).is_const() {
                    continue;
                }
                self.current_output = o;
                if self.find_bad_cube(k)?.is_some() {
                    self.truncate_frames(k);
                    return Ok(Restored { failures, start: k });
                }
                self.constrain_output(k, o)?;
            }
        }
        Ok(Restored { failures, start: last })
    }

    /// Folds the clauses of every frame above `k` into frame `k`.
    fn truncate_frames(&mut self, k: usize) {
        let above: Vec<Cube> = self.frames[k + 1..]
            .iter()
            .flat_map(|f| f.clauses.clone())
            .collect();
        self.frames.truncate(k + 1);
        self.frames[k].clauses.extend(above);
    }

    /// Restores `db` and searches on from it. The restored frames are pushed
    /// once first, which may already reach a fixed point.
    pub fn resume(
        &mut self,
        db: &ClauseDatabase,
    ) -> Result<(Vec<RevalidationFailure>, usize), PdrError> {
        if self.settle_constant_outputs(0)? {
            return Ok((Vec::new(), 0));
        }
        let restored = match self.restore(db) {
            Ok(restored) => restored,
            Err(PdrError::ResourceExhausted(msg)) => {
                let reason = self.stop_reason(msg);
                let frame = self.last_frame();
                self.close_open_outputs(frame, reason);
                return Ok((Vec::new(), frame));
            }
            Err(err) => return Err(err),
        };
        let Restored { failures, start } = restored;
        if self.open_outputs() > 0 {
            let pushed = match self.push_clauses() {
                Ok(Some(k)) => self.prove_open_outputs(k).map(|_| true),
                Ok(None) => Ok(false),
                Err(err) => Err(err),
            };
            match pushed {
                Ok(true) => return Ok((failures, start)),
                Ok(false) => {}
                Err(PdrError::ResourceExhausted(msg)) => {
                    let reason = self.stop_reason(msg);
                    self.close_open_outputs(start, reason);
                    return Ok((failures, start));
                }
                Err(err) => return Err(err),
            }
        }
        let explored = self.run(start)?;
        Ok((failures, explored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdrConfig;
    use crate::cube::StateLit;
    use crate::design::Design;
    use latchproof_ir::{Edge, Reset, TransitionSystem};
    use latchproof_sat::backends::z3_backend::Z3Factory;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// `a' = b`, `b' = 0`, `c' = 1`; output `a`.
    fn sticky_zero() -> Result<Design, PdrError> {
        let mut ts = TransitionSystem::new();
        let a = ts.add_register("a", Reset::Zero)?;
        let b = ts.add_register("b", Reset::Zero)?;
        let c = ts.add_register("c", Reset::Zero)?;
        ts.set_next(a, b)?;
        ts.set_next(b, Edge::FALSE)?;
        ts.set_next(c, Edge::TRUE)?;
        ts.add_output("bad", a)?;
        Design::new(&ts)
    }

    fn cube(lits: &[(usize, bool)]) -> Cube {
        Cube::new(lits.iter().map(|&(r, n)| StateLit::new(r, n))).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn saving_needs_more_than_the_initial_frame() -> TestResult {
        let design = sticky_zero()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        mgr.push_frame()?;
        assert!(mgr.save_clauses(false).is_none());
        mgr.push_frame()?;
        assert!(mgr.save_clauses(true).is_none());
        mgr.push_frame()?;
        mgr.add_learned_clause(2, &cube(&[(0, false)]))?;
        let db = mgr.save_clauses(true).ok_or("expected a database")?;
        assert_eq!(db.num_frames(), 2);
        assert_eq!(db.frames[1], vec![vec![0]]);
        Ok(())
    }

    #[test]
    fn json_round_trip_preserves_the_database() -> TestResult {
        let db = ClauseDatabase {
            fingerprint: "abc".into(),
            num_registers: 2,
            frames: vec![vec![], vec![vec![0, 3]]],
        };
        assert_eq!(ClauseDatabase::from_json(&db.to_json()?)?, db);
        Ok(())
    }

    #[test]
    fn foreign_database_is_rejected() -> TestResult {
        let design = sticky_zero()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        let db = ClauseDatabase {
            fingerprint: "not this one".into(),
            num_registers: design.num_registers(),
            frames: vec![vec![], vec![]],
        };
        assert!(matches!(mgr.restore(&db), Err(PdrError::MalformedInput(_))));
        Ok(())
    }

    #[test]
    fn broken_clauses_are_reported_and_dropped() -> TestResult {
        let design = sticky_zero()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        // b stays low forever while c rises after one step
        let db = ClauseDatabase {
            fingerprint: design.fingerprint().to_string(),
            num_registers: design.num_registers(),
            frames: vec![
                vec![],
                vec![cube(&[(1, false)]).codes(), cube(&[(2, false)]).codes()],
            ],
        };
        let failures = mgr.restore(&db)?.failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].frame, 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(mgr.frames[1].clauses.len(), 1);
        Ok(())
    }
}

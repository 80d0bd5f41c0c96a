// capgate-core/src/domain/plan/mod.rs
// ============================================================================
// Module: Plan Compiler + Plan Cache (components I, J)
// Description: Compiles capsule definitions into optimized, validated,
//              hash-addressed execution plans, and caches the result.
// Purpose: Implements spec §4.7/§4.8.
// Dependencies: see submodules
// ============================================================================

//! ## Overview
//! The pipeline is model (data types) → dependency (resolution + graph
//! analysis) → compiler (capsule → plan) → optimizer → validator, with
//! [`cache`] sitting alongside as an independent consumer of the compiled
//! [`model::ExecutablePlan`]. [`PlanService`] wires compilation and caching
//! together for callers that don't need the submodules directly.

pub mod cache;
pub mod compiler;
pub mod dependency;
pub mod model;
pub mod optimizer;
pub mod validator;

use crate::core::identifiers::TenantId;
use crate::domain::errors::PlanCompileError;
use crate::domain::plan::cache::CacheConfig;
use crate::domain::plan::cache::PlanCache;
use crate::domain::plan::compiler::CompilationRequest;
use crate::domain::plan::compiler::CompilationResult;
use crate::domain::plan::compiler::PlanCompiler;
use crate::domain::plan::dependency::DependencyRegistry;
use crate::domain::plan::model::CapsuleDefinition;

/// Compiles capsules and caches the resulting plans behind one call.
pub struct PlanService<'a> {
    compiler: PlanCompiler<'a>,
    cache: PlanCache,
}

impl<'a> PlanService<'a> {
    /// Builds a service over a dependency registry and cache configuration.
    #[must_use]
    pub fn new(registry: &'a dyn DependencyRegistry, cache_config: CacheConfig) -> Self {
        Self { compiler: PlanCompiler::new(registry), cache: PlanCache::new(cache_config) }
    }

    /// Compiles `capsule` and, on success, stores the resulting plan in the
    /// cache tagged with the source capsule name.
    ///
    /// # Errors
    /// Returns [`PlanCompileError`] only for internal failures; see
    /// [`PlanCompiler::compile_capsule`].
    pub fn compile_and_cache(
        &self,
        capsule: &CapsuleDefinition,
        tenant_id: TenantId,
        request: &CompilationRequest,
        now: i64,
    ) -> Result<CompilationResult, PlanCompileError> {
        let result = self.compiler.compile_capsule(capsule, tenant_id, request, now)?;
        if let Some(plan) = result.plan.clone().filter(|_| result.success) {
            let _ = self.cache.put(plan, vec![capsule.name.clone()], None, now);
        }
        Ok(result)
    }

    /// Returns a handle to the underlying cache for direct lookups or
    /// invalidation.
    #[must_use]
    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }
}

//! Combines policies attached at different levels into the policy that is in effect for a request.
//!
//! Merging is driven by presence: a field that a more specific policy sets replaces the
//! accumulated value (recursing into nested objects), and a field that it leaves unset is inherited.

use std::collections::BTreeMap;

use kgateway_enterprise_crd_utils::{PolicyDisable, RawConfig};
use serde_json::{Map, Value};
use snafu::{ensure, Snafu};

use crate::attachment::{AttachablePolicy, Precedence};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "cannot merge a {level} level policy onto policies that were merged up to the {highest} level"
    ))]
    LayerBelowMerged {
        level: Precedence,
        highest: Precedence,
    },
}

pub trait Merge {
    /// Overlays `higher`, which comes from a more specific attachment level, onto `self`.
    fn merge_from(&mut self, higher: Self);
}

impl<T: Merge> Merge for Option<T> {
    fn merge_from(&mut self, higher: Self) {
        if let Some(higher) = higher {
            match self {
                Some(lower) => lower.merge_from(higher),
                None => *self = Some(higher),
            }
        }
    }
}

/// Implements [`Merge`] for types that are always replaced as a whole.
macro_rules! merge_atomic {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::merge::Merge for $ty {
                fn merge_from(&mut self, higher: Self) {
                    *self = higher;
                }
            }
        )*
    };
}
pub(crate) use merge_atomic;

/// Implements [`Merge`] for a struct of optional fields.
///
/// Plain fields are merged one by one. Fields listed in an `exclusive` group are only valid on
/// their own, so if the higher level sets any member of a group the whole group is taken from it.
macro_rules! merge_fields {
    (
        $ty:ty { $($field:ident),* $(,)? }
        $(exclusive { $(($($member:ident),+ $(,)?)),* $(,)? })?
    ) => {
        impl $crate::merge::Merge for $ty {
            fn merge_from(&mut self, higher: Self) {
                $(
                    $crate::merge::Merge::merge_from(&mut self.$field, higher.$field);
                )*
                $($(
                    if false $(|| higher.$member.is_some())+ {
                        $(self.$member = higher.$member;)+
                    }
                )*)?
            }
        }
    };
}
pub(crate) use merge_fields;

merge_atomic!(String, bool, i32, i64, PolicyDisable);

// Lists and keyed maps are replaced wholesale, the entries of a lower level never leak into a higher level's list.
impl<T> Merge for Vec<T> {
    fn merge_from(&mut self, higher: Self) {
        *self = higher;
    }
}

impl<K: Ord, V> Merge for BTreeMap<K, V> {
    fn merge_from(&mut self, higher: Self) {
        *self = higher;
    }
}

impl Merge for RawConfig {
    fn merge_from(&mut self, higher: Self) {
        merge_json(&mut self.0, higher.0);
    }
}

/// Merges JSON objects key by key. Anything else (including arrays) is replaced.
///
/// `null` members of `higher` count as unset, at any depth.
fn merge_json(lower: &mut Value, higher: Value) {
    match higher {
        Value::Null => {}
        Value::Object(higher) => {
            if !lower.is_object() {
                *lower = Value::Object(Map::new());
            }
            if let Value::Object(lower) = lower {
                for (key, value) in higher {
                    if value.is_null() {
                        continue;
                    }
                    merge_json(lower.entry(key).or_insert(Value::Null), value);
                }
            }
        }
        higher => *lower = higher,
    }
}

/// The result of merging policies in order of increasing [`Precedence`].
///
/// More policies can be merged in later, as long as they are at least as specific as the ones
/// merged so far. The result is the same as merging all of them at once.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectivePolicy<P> {
    highest: Option<Precedence>,
    policy: Option<P>,
}

impl<P> Default for EffectivePolicy<P> {
    fn default() -> Self {
        Self {
            highest: None,
            policy: None,
        }
    }
}

impl<P: Merge + AttachablePolicy> EffectivePolicy<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `layers` in order of precedence. Layers at the same level keep their relative order.
    pub fn from_layers(layers: impl IntoIterator<Item = (Precedence, P)>) -> Self {
        let mut effective = Self::new();
        effective.fold(sorted(layers));
        effective
    }

    /// Merges more `layers` onto the policies merged so far.
    pub fn extend(&mut self, layers: impl IntoIterator<Item = (Precedence, P)>) -> Result<(), Error> {
        let layers = sorted(layers);
        if let (Some(highest), Some((level, _))) = (self.highest, layers.first()) {
            ensure!(
                *level >= highest,
                LayerBelowMergedSnafu {
                    level: *level,
                    highest
                }
            );
        }
        self.fold(layers);
        Ok(())
    }

    fn fold(&mut self, layers: Vec<(Precedence, P)>) {
        for (level, mut policy) in layers {
            tracing::trace!(%level, "merging policy layer");
            policy.clear_targets();
            self.policy.merge_from(Some(policy));
            self.highest = Some(level);
        }
    }

    /// The most specific level merged so far.
    pub fn highest(&self) -> Option<Precedence> {
        self.highest
    }

    pub fn policy(&self) -> Option<&P> {
        self.policy.as_ref()
    }

    pub fn into_policy(self) -> Option<P> {
        self.policy
    }
}

fn sorted<P>(layers: impl IntoIterator<Item = (Precedence, P)>) -> Vec<(Precedence, P)> {
    let mut layers: Vec<_> = layers.into_iter().collect();
    layers.sort_by_key(|(level, _)| *level);
    layers
}

/// Folds policies attached at different levels into the one in effect, which has no targets.
///
/// Returns [`None`] if there are no policies.
pub fn merge_by_precedence<P: Merge + AttachablePolicy>(
    layers: impl IntoIterator<Item = (Precedence, P)>,
) -> Option<P> {
    EffectivePolicy::from_layers(layers).into_policy()
}

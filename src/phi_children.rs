use crate::{
    procedure::Procedure, sparse_collection::SparseElement, utils::index_set::IndexMap,
    value::ValueId,
};

/// Reverse index from each Phi to the Upsilons that feed it.
#[derive(Debug, Default)]
pub struct PhiChildren {
    upsilons: IndexMap<Vec<ValueId>, ValueId>,
    phis: Vec<ValueId>,
}

impl PhiChildren {
    pub fn new(proc: &Procedure) -> Self {
        let mut this = Self::default();

        for value in proc.values() {
            let Some(phi) = value.phi() else {
                continue;
            };

            let upsilons = this.upsilons.get_or_insert_with(phi, Vec::new);
            if upsilons.is_empty() {
                this.phis.push(phi);
            }

            upsilons.push(value.id());
        }

        this
    }

    pub fn phis(&self) -> &[ValueId] {
        &self.phis
    }

    pub fn upsilons_of(&self, phi: ValueId) -> &[ValueId] {
        self.upsilons.get(&phi).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The values flowing into `phi`, paired with the Upsilon that carries each one.
    pub fn incoming<'a>(
        &'a self,
        phi: ValueId,
        proc: &'a Procedure,
    ) -> impl Iterator<Item = (ValueId, ValueId)> + 'a {
        self.upsilons_of(phi)
            .iter()
            .map(move |upsilon| (*upsilon, proc.value(*upsilon).child(0)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{block::BasicBlockBuilder, typ::Type};

    use super::*;

    #[test]
    fn upsilons_are_grouped_by_phi() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();
        let body = proc.add_block();

        let mut builder = BasicBlockBuilder::new(&mut proc, body);
        let phi = builder.phi(Type::Int64);
        let other = builder.phi(Type::Int64);
        builder.return_(None);

        builder.switch_to_block(entry);
        let zero = builder.const64(0);
        let one = builder.const64(1);
        let a = builder.upsilon(zero, phi);
        let b = builder.upsilon(one, phi);
        builder.jump(Some(body));

        let children = PhiChildren::new(&proc);
        assert_eq!(children.phis(), &[phi]);
        assert_eq!(children.upsilons_of(phi), &[a, b]);
        assert!(children.upsilons_of(other).is_empty());

        let incoming: Vec<_> = children.incoming(phi, &proc).collect();
        assert_eq!(incoming, vec![(a, zero), (b, one)]);
    }
}

// Copyright 2024. The Pebble Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::sync::Arc;

use crate::consensus::{ConsensusConstants, ConsensusConstantsBuilder, Network};

/// Shared, immutable handle to the protocol rules for a network.
#[derive(Debug, Clone)]
pub struct ConsensusManager {
    inner: Arc<ConsensusManagerInner>,
}

#[derive(Debug)]
struct ConsensusManagerInner {
    network: Network,
    constants: ConsensusConstants,
}

impl ConsensusManager {
    pub fn builder(network: Network) -> ConsensusManagerBuilder {
        ConsensusManagerBuilder {
            network,
            constants: None,
        }
    }

    pub fn network(&self) -> Network {
        self.inner.network
    }

    pub fn consensus_constants(&self) -> &ConsensusConstants {
        &self.inner.constants
    }
}

pub struct ConsensusManagerBuilder {
    network: Network,
    constants: Option<ConsensusConstants>,
}

impl ConsensusManagerBuilder {
    pub fn with_consensus_constants(mut self, constants: ConsensusConstants) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn build(self) -> ConsensusManager {
        let constants = self
            .constants
            .unwrap_or_else(|| ConsensusConstantsBuilder::new(self.network).build());
        ConsensusManager {
            inner: Arc::new(ConsensusManagerInner {
                network: self.network,
                constants,
            }),
        }
    }
}

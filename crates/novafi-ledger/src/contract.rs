//! ABI of the marketplace contract.

use alloy::sol;

sol! {
	#[sol(rpc)]
	contract IntentMarketplace {
		event IntentCreated(uint256 indexed intentId, address indexed creator, string description, uint256 createdAt);
		event ProposalCreated(uint256 indexed proposalId, uint256 indexed intentId, address indexed solver, uint256 amount);
		event ProposalAccepted(uint256 indexed proposalId, uint256 indexed intentId);
		event ProposalRejected(uint256 indexed proposalId, uint256 indexed intentId);
		event IntentCancelled(uint256 indexed intentId);

		function getCounters() external view returns (uint256 totalIntents, uint256 totalProposals);
		function getIntentBasicInfo(uint256 intentId) external view returns (uint256 id, address creator, string memory description, uint256 createdAt);
		function getIntentStatus(uint256 intentId) external view returns (uint8 status, uint256 acceptedProposalId, uint256 proposalCount);
		function getIntentProposals(uint256 intentId) external view returns (uint256[] memory);
		function getProposal(uint256 proposalId) external view returns (uint256 id, uint256 intentId, address solver, uint256 amount, string memory message, uint256 createdAt, uint8 status);
		function getUserIntents(address user) external view returns (uint256[] memory);

		function createIntent(string memory description) external returns (uint256);
		function createProposal(uint256 intentId, uint256 amount, string memory message) external returns (uint256);
		function acceptProposal(uint256 proposalId) external payable;
		function rejectProposal(uint256 proposalId) external;
		function cancelIntent(uint256 intentId) external;
	}
}
